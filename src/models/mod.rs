pub mod book;
pub mod exemplar;
pub mod lending;
pub mod member;

pub use book::BookStatus;
pub use exemplar::ExemplarStatus;
pub use lending::LendingStatus;
