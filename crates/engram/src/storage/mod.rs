pub mod lance;

pub use lance::{collection_name, LanceStore};
