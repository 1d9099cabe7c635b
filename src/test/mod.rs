pub mod utils;

mod upload;
