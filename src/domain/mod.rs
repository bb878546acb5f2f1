// Domain layer: core models and ports (interfaces). No dependencies on
// adapters or the HTTP stack.

pub mod model;
pub mod ports;
