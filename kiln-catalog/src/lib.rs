pub mod product;
pub mod pricing;
pub mod repository;

pub use product::{FulfillmentConfig, FulfillmentProvider, Product};
pub use pricing::{currency_exponent, line_total, to_minor_units, PricingError};
pub use repository::{CatalogError, InMemoryProductRepository, ProductRepository};
