pub mod deliveries;
pub mod records;
