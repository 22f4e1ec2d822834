pub mod address;
pub mod pii;

pub use address::ShippingAddress;
pub use pii::Masked;
