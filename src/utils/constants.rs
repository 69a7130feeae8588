/// Bundle layout and pipeline defaults
///
/// File names are part of the restore contract: restore.sh and the dashboard
/// both refer to artifacts by these names.

use std::time::Duration;

/// Normalized host + container document. Doubles as the persisted snapshot
/// the differ compares the next run against.
pub const CONFIG_FILE: &str = "server-config.json";

/// Derived multi-container compose document.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Plain-text change log, one entry per line.
pub const CHANGES_FILE: &str = "changes.log";

/// Idempotent restoration script.
pub const RESTORE_FILE: &str = "restore.sh";

/// Masked-secrets template (key names only).
pub const SECRETS_FILE: &str = "secrets-template.env";

/// Per-bundle recovery README.
pub const README_FILE: &str = "README.md";

/// Subdirectory holding per-container native template files.
pub const TEMPLATES_DIR: &str = "templates";

/// Default bundle destination (bind-mounted in the container deployment).
pub const DEFAULT_OUTPUT_DIR: &str = "/output";

/// Unraid dockerMan user-template cache. Read-only for the pipeline; an
/// external collaborator refreshes it.
pub const DEFAULT_TEMPLATE_DIR: &str = "/boot/config/plugins/dockerMan/templates-user";

/// Host configuration files (optional bind-mounts, absence tolerated).
pub const HOST_IDENT_FILE: &str = "/boot/config/ident.cfg";
pub const HOST_VERSION_FILES: &[&str] = &["/boot/version", "/boot/config/version"];
pub const HOST_SHARES_DIR: &str = "/boot/config/shares";
pub const HOST_PLUGINS_DIR: &str = "/boot/config/plugins";

/// Environment variable keys containing any of these (case-insensitive) are
/// classified as secrets. Default for `MaskPolicy`; callers may extend.
pub const SECRET_KEYWORDS: &[&str] = &[
    "PASSWORD",
    "SECRET",
    "TOKEN",
    "KEY",
    "CREDENTIAL",
    "APIKEY",
];

/// Stable placeholder written in place of masked values. Encodes nothing
/// about the original value.
pub const MASK_PLACEHOLDER: &str = "***MASKED***";

/// Label consulted for explicit service ordering in the compose document.
pub const DEPENDS_ON_LABEL: &str = "com.docker.compose.depends_on";

/// Engine networks that are implicit and never declared in the compose
/// document or created by the restore script.
pub const IMPLICIT_NETWORKS: &[&str] = &["bridge", "host", "none"];

/// Worker-pool width for per-container inspect calls.
pub const DEFAULT_INSPECT_WIDTH: usize = 6;

/// Ceiling on the whole engine-query phase of a run.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(120);
