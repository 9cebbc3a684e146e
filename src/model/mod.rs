// Vehicle motion model module

pub mod bicycle;

pub use bicycle::*;
