//! Specialist registry: build the decorated pack for a specialist id.
//!
//! Decoration order (outer to inner): `Containerised(McpAugmented(Base))`.
//! Only specialists declared in config are available. Custom packs are
//! registered programmatically with [`SpecialistRegistry::register_builder`]
//! (there is no dynamic loading).

use std::collections::HashMap;
use std::path::Path;

use maestro_domain::config::Config;
use maestro_domain::error::{Error, Result};
use maestro_mcp::McpSession;

use crate::containerised::ContainerisedPack;
use crate::engineering::build_engineering_pack;
use crate::enterprise::build_enterprise_research_pack;
use crate::mcp_augmented::McpAugmentedPack;
use crate::pack::SpecialistPack;
use crate::research::build_research_pack;

/// A pack factory: `(workspace_path, network_allowed) → pack`.
pub type BuilderFn = Box<dyn Fn(&Path, bool) -> Box<dyn SpecialistPack> + Send + Sync>;

pub struct SpecialistRegistry {
    config: Config,
    custom: HashMap<String, BuilderFn>,
}

impl SpecialistRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            custom: HashMap::new(),
        }
    }

    /// Register a custom pack factory for a specialist id. Overrides the
    /// built-in builder for that id.
    pub fn register_builder(&mut self, specialist_id: impl Into<String>, builder: BuilderFn) {
        self.custom.insert(specialist_id.into(), builder);
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.config
            .specialists
            .iter()
            .map(|s| s.id.clone())
            .collect()
    }

    /// Build the (decorated) pack for a specialist.
    pub fn get_pack(
        &self,
        specialist_id: &str,
        workspace_path: &Path,
        network_allowed: bool,
    ) -> Result<Box<dyn SpecialistPack>> {
        let spec_cfg = self
            .config
            .specialist(specialist_id)
            .ok_or_else(|| Error::Recruit(specialist_id.to_string()))?;

        let base: Box<dyn SpecialistPack> = if let Some(builder) = self.custom.get(specialist_id) {
            builder(workspace_path, network_allowed)
        } else {
            match specialist_id {
                "engineering" => Box::new(
                    build_engineering_pack(workspace_path, network_allowed)
                        .with_browser(spec_cfg.browser),
                ),
                "research" => Box::new(
                    build_research_pack(workspace_path, network_allowed)
                        .with_browser(spec_cfg.browser),
                ),
                "enterprise_research" => Box::new(
                    build_enterprise_research_pack(workspace_path, network_allowed)
                        .with_browser(spec_cfg.browser),
                ),
                other => {
                    return Err(Error::Config(format!(
                        "no pack implementation for specialist {other:?}; \
                         register a builder for it"
                    )))
                }
            }
        };

        let mut pack: Box<dyn SpecialistPack> = base;

        if !spec_cfg.mcp_servers.is_empty() {
            let sessions: Vec<McpSession> = spec_cfg
                .mcp_servers
                .iter()
                .cloned()
                .map(McpSession::new)
                .collect();
            tracing::debug!(
                specialist_id,
                servers = sessions.len(),
                "attaching MCP sessions"
            );
            pack = Box::new(McpAugmentedPack::new(pack, sessions));
        }

        if let Some(image) = &spec_cfg.container_image {
            tracing::debug!(specialist_id, image = %image, "wrapping pack in container");
            pack = Box::new(ContainerisedPack::new(pack, image.clone(), workspace_path));
        }

        Ok(pack)
    }
}
