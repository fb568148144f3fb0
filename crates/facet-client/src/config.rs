use facet_types::{ConnectionArgs, TypeError};

/// Client-wide settings.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Page size used when a connection query does not supply its own args.
    pub default_page_size: u32,
    /// Typename of the synthetic root entity owning root-level connections.
    pub root_typename: String,
    /// Id of the synthetic root entity.
    pub root_id: String,
}

impl ClientConfig {
    /// Connection args carrying only the configured default page size.
    pub fn default_args(&self) -> Result<ConnectionArgs, TypeError> {
        ConnectionArgs::new(self.default_page_size)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            root_typename: "Query".to_string(),
            root_id: "root".to_string(),
        }
    }
}
