#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod answer;
pub mod diversity;
pub mod service;

pub use diversity::DiversityReranker;
pub use service::QueryService;
