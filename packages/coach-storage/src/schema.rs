pub const SCHEMA: &str = include_str!("../../../sql/init.sql");
