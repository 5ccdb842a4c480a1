// Domain layer: models, phone rules and ports. No I/O here.

pub mod model;
pub mod phone;
pub mod ports;
