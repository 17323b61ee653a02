//! Configuration access port trait.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;

    /// Section names in file order.
    fn sections(&self) -> Vec<String>;

    /// Key/value pairs of one section in file order. Keys without a value
    /// are skipped.
    fn section_entries(&self, section: &str) -> Vec<(String, String)>;
}
