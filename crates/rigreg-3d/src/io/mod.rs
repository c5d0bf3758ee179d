/// PCD reader and writer module.
pub mod pcd;
