pub mod commitment;
pub mod purchase;
pub mod recommendation;
pub mod service;
pub mod terms;
