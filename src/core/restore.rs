/// Restoration script generation
///
/// Emits a shell script that rebuilds the container topology on a fresh or
/// partially-configured host. Every step checks for existing state before
/// creating anything, so the script is safe to re-run. Networks and volumes
/// are always applied before any container; the compose service order on top
/// of that is advisory.

use chrono::{DateTime, Utc};

use crate::core::compose::ComposeDocument;
use crate::core::templates::{BindingState, TemplateBinding};
use crate::utils::{COMPOSE_FILE, DEFAULT_TEMPLATE_DIR, TEMPLATES_DIR};

pub fn emit_restore_script(
    doc: &ComposeDocument,
    bindings: &[TemplateBinding],
    hostname: &str,
    generated_at: &DateTime<Utc>,
) -> String {
    let mut script = format!(
        "#!/bin/bash\n\
         # Config Guardian - Restore Script\n\
         # Generated: {}\n\
         # Server: {}\n\
         set -e\n\n\
         echo \"Restoring container topology...\"\n\n\
         # Check prerequisites\n\
         if ! command -v docker >/dev/null 2>&1; then\n\
         \x20   echo \"docker not found\" >&2\n\
         \x20   exit 1\n\
         fi\n\n\
         if [ ! -f \"{}\" ]; then\n\
         \x20   echo \"{} not found - run this script from the backup directory\" >&2\n\
         \x20   exit 1\n\
         fi\n",
        generated_at.to_rfc3339(),
        hostname,
        COMPOSE_FILE,
        COMPOSE_FILE,
    );

    if !doc.networks.is_empty() {
        script.push_str("\n# Networks (existence-checked, applied before any container)\n");
        for network in &doc.networks {
            script.push_str(&format!(
                "if ! docker network inspect \"{n}\" >/dev/null 2>&1; then\n\
                 \x20   docker network create \"{n}\"\n\
                 fi\n",
                n = network
            ));
        }
    }

    if !doc.volumes.is_empty() {
        script.push_str("\n# Volumes (existence-checked, applied before any container)\n");
        for volume in &doc.volumes {
            script.push_str(&format!(
                "if ! docker volume inspect \"{v}\" >/dev/null 2>&1; then\n\
                 \x20   docker volume create \"{v}\"\n\
                 fi\n",
                v = volume
            ));
        }
    }

    let native: Vec<&TemplateBinding> = bindings
        .iter()
        .filter(|b| b.state != BindingState::Synthesized)
        .collect();

    if !native.is_empty() {
        script.push_str(&format!(
            "\n# Native templates (authoritative for host-specific integration)\n\
             TEMPLATE_DIR=\"{}\"\n\
             if [ -d \"$(dirname \"$TEMPLATE_DIR\")\" ]; then\n\
             \x20   mkdir -p \"$TEMPLATE_DIR\"\n",
            DEFAULT_TEMPLATE_DIR
        ));
        for binding in &native {
            // cp -n keeps re-runs from clobbering operator edits.
            script.push_str(&format!(
                "    cp -n \"{}/{}\" \"$TEMPLATE_DIR/\" || true\n",
                TEMPLATES_DIR, binding.file_name
            ));
        }
        script.push_str(
            "    echo \"Native templates copied; re-apply them from the Docker tab.\"\n\
             else\n\
             \x20   echo \"dockerMan not present; skipping native templates\" >&2\n\
             fi\n",
        );
    }

    // Containers without a native template fall back to the compose
    // definition. Service order already places dependencies first.
    let fallback: Vec<&str> = doc
        .services
        .iter()
        .filter(|s| {
            bindings
                .iter()
                .find(|b| b.container == s.container_name)
                .map(|b| b.state == BindingState::Synthesized)
                .unwrap_or(true)
        })
        .map(|s| s.name.as_str())
        .collect();

    if !fallback.is_empty() {
        script.push_str(&format!(
            "\n# Compose fallback (--no-recreate keeps re-runs idempotent)\n\
             docker compose -f \"{}\" up -d --no-recreate {}\n",
            COMPOSE_FILE,
            fallback.join(" ")
        ));
    }

    script.push_str(
        "\necho \"Restore complete.\"\n\
         echo \"Next steps:\"\n\
         echo \"  1. Refill secret values from secrets-template.env\"\n\
         echo \"  2. Restore application data from your data backup\"\n\
         echo \"  3. Check container status: docker ps\"\n",
    );

    script
}
