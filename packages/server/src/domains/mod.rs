// Business domains
pub mod digest;
pub mod items;
pub mod podcasts;
pub mod users;
