// Domain layer: the record set model and the ports implemented by adapters.

pub mod model;
pub mod ports;
