// Domain-layer modules and shared errors/models
pub mod extraction {
    pub use crate::extraction::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
