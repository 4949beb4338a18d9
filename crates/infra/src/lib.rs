pub mod alerts;
pub mod billing;
pub mod db;
pub mod identity;
