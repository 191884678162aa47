//! Annotation contract shared between the user and the operator.

pub static ENABLE_ANNOTATION: &str = "image-updater.eznix86.github.io/enabled";
pub static TRACK_CONTAINERS_ANNOTATION: &str = "image-updater.eznix86.github.io/track-containers";
pub static IGNORE_CONTAINERS_ANNOTATION: &str = "image-updater.eznix86.github.io/ignore-containers";
pub static TRACK_INIT_CONTAINERS_ANNOTATION: &str =
    "image-updater.eznix86.github.io/track-init-containers";
pub static LAST_DIGEST_ANNOTATION: &str = "image-updater.eznix86.github.io/last-digest";
pub static RESTART_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

pub static FIELD_MANAGER: &str = "kube-image-updater";
