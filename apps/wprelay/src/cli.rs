use clap::Parser;

/// Every value is a raw string so blank and `${VAR}` placeholders can be
/// treated as unset before parsing.
#[derive(Clone, Default, Parser)]
#[command(
    name = "wprelay",
    version,
    about = "Credential-injecting GraphQL and image relay for a WordPress-backed site"
)]
pub(crate) struct CliArgs {
    /// Bind host.
    #[arg(long, env = "WPRELAY_HOST")]
    pub(crate) host: Option<String>,

    /// Bind port.
    #[arg(long, env = "WPRELAY_PORT")]
    pub(crate) port: Option<String>,

    /// WPGraphQL endpoint the relay forwards to.
    #[arg(long, env = "WPRELAY_GRAPHQL_URL")]
    pub(crate) graphql_url: Option<String>,

    /// WordPress application-password user.
    #[arg(long, env = "WPRELAY_GRAPHQL_USERNAME")]
    pub(crate) graphql_username: Option<String>,

    /// WordPress application password.
    #[arg(long, env = "WPRELAY_GRAPHQL_PASSWORD", hide_env_values = true)]
    pub(crate) graphql_password: Option<String>,

    /// Upstream GraphQL deadline in seconds.
    #[arg(long, env = "WPRELAY_GRAPHQL_TIMEOUT_SECS")]
    pub(crate) graphql_timeout_secs: Option<String>,

    /// Comma separated hosts the image relay may fetch from.
    #[arg(long, env = "WPRELAY_IMAGE_ALLOWED_HOSTS")]
    pub(crate) image_allowed_hosts: Option<String>,

    /// Optional outbound proxy for upstream requests.
    #[arg(long, env = "WPRELAY_PROXY")]
    pub(crate) proxy: Option<String>,
}
