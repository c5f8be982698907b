pub mod quantities;

pub use quantities::ResourceQuantities;
