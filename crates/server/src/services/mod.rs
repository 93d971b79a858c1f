pub mod class_code;
pub mod classroom;
pub mod feed;
pub mod uploads;
