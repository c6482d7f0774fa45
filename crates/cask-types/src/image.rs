use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;

/// A named pointer into the blob graph: the root manifest or index of an image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub target: Descriptor,
}

impl Image {
    pub fn new(name: impl Into<String>, target: Descriptor) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}
