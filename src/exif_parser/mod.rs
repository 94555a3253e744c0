pub mod gps;
pub mod metadata;
pub mod reader;

pub use gps::gps_coordinate;
pub use reader::read_metadata;
