//! Media type constants for OCI and Docker schema2 content.

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";

pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_LAYER_FOREIGN: &str =
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";

/// Single-image manifest types (config + layers).
pub fn is_manifest(media_type: &str) -> bool {
    matches!(media_type, OCI_MANIFEST | DOCKER_MANIFEST)
}

/// Multi-platform index / manifest-list types.
pub fn is_index(media_type: &str) -> bool {
    matches!(media_type, OCI_INDEX | DOCKER_MANIFEST_LIST)
}

/// Anything that references other blobs and must be pushed after them.
pub fn is_manifest_like(media_type: &str) -> bool {
    is_manifest(media_type) || is_index(media_type)
}

/// Known content types with no children.
pub fn is_leaf(media_type: &str) -> bool {
    matches!(
        media_type,
        OCI_CONFIG
            | OCI_LAYER
            | OCI_LAYER_GZIP
            | OCI_LAYER_ZSTD
            | DOCKER_CONFIG
            | DOCKER_LAYER
            | DOCKER_LAYER_GZIP
            | DOCKER_LAYER_FOREIGN
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        for mt in [OCI_MANIFEST, DOCKER_MANIFEST] {
            assert!(is_manifest(mt) && is_manifest_like(mt) && !is_index(mt) && !is_leaf(mt));
        }
        for mt in [OCI_INDEX, DOCKER_MANIFEST_LIST] {
            assert!(is_index(mt) && is_manifest_like(mt) && !is_manifest(mt));
        }
        for mt in [OCI_CONFIG, OCI_LAYER_GZIP, DOCKER_LAYER_FOREIGN] {
            assert!(is_leaf(mt) && !is_manifest_like(mt));
        }
        assert!(!is_leaf("application/octet-stream"));
    }
}
