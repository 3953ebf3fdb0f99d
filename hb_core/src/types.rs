use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Granularity at which one resource instance is shared.
///
/// `Run` > `Class` > `Method`: a run-scoped instance outlives every class,
/// a class-scoped one outlives every method of its class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Scope {
    Run,
    #[default]
    Class,
    Method
}

impl Scope {
    /// Relative lifetime of the scope; larger outlives smaller.
    pub fn granularity(self) -> u8 {
        match self {
            Self::Run => 3,
            Self::Class => 2,
            Self::Method => 1
        }
    }

    pub fn outlives(self, other: Scope) -> bool {
        self.granularity() > other.granularity()
    }
}

/// Migration engine selector. The set is closed; dispatch matches on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MigrationEngine {
    #[default]
    None,
    Scripts,
    Flyway,
    Liquibase,
    Cognitor
}

/// Boundary at which a migration apply or drop runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MigrationScope {
    #[default]
    None,
    PerClass,
    PerMethod
}

impl MigrationScope {
    pub fn is_set(self) -> bool {
        self != Self::None
    }
}

/// Declarative migration configuration attached to a resource declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MigrationPolicy {
    pub engine: MigrationEngine,
    pub apply: MigrationScope,
    pub drop: MigrationScope,
    pub locations: Vec<String>
}

impl MigrationPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I, S>(engine: MigrationEngine, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engine,
            apply: MigrationScope::None,
            drop: MigrationScope::None,
            locations: locations.into_iter().map(Into::into).collect()
        }
    }

    pub fn with_apply(mut self, apply: MigrationScope) -> Self {
        self.apply = apply;
        self
    }

    pub fn with_drop(mut self, drop: MigrationScope) -> Self {
        self.drop = drop;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.engine != MigrationEngine::None
    }

    pub fn applies_at(&self, boundary: MigrationScope) -> bool {
        self.is_enabled() && boundary.is_set() && self.apply == boundary
    }

    pub fn drops_at(&self, boundary: MigrationScope) -> bool {
        self.is_enabled() && boundary.is_set() && self.drop == boundary
    }
}

/// Identity of interchangeable resource instances.
///
/// Two declarations with equal keys under [`Scope::Run`] share one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    image: String,
    shared_network: bool,
    network_alias: Option<String>
}

impl ResourceKey {
    pub fn new(image: impl Into<String>, shared_network: bool, network_alias: Option<String>) -> Self {
        Self {
            image: image.into(),
            shared_network,
            network_alias
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn shared_network(&self) -> bool {
        self.shared_network
    }

    pub fn network_alias(&self) -> Option<&str> {
        self.network_alias.as_deref()
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.image)?;
        if self.shared_network {
            write!(f, " (shared network")?;
            if let Some(alias) = &self.network_alias {
                write!(f, ", alias {}", alias)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NetworkSettings {
    pub shared: bool,
    pub alias: Option<String>
}

/// Everything a test class declares about one backend resource.
///
/// `image` may still contain a `${ENV|default}` placeholder; it is resolved
/// when the resource key is derived. Left blank, the backend's default image
/// is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub mode: Scope,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub migration: MigrationPolicy
}

impl ResourceDeclaration {
    pub fn new(image: impl Into<String>, mode: Scope) -> Self {
        Self {
            image: image.into(),
            mode,
            network: NetworkSettings::default(),
            migration: MigrationPolicy::none()
        }
    }

    pub fn with_migration(mut self, migration: MigrationPolicy) -> Self {
        self.migration = migration;
        self
    }

    pub fn with_shared_network(mut self, alias: Option<String>) -> Self {
        self.network = NetworkSettings {
            shared: true,
            alias
        };
        self
    }

    /// Derives the identity for an already-resolved image reference.
    pub fn key_for(&self, resolved_image: impl Into<String>) -> ResourceKey {
        ResourceKey::new(
            resolved_image,
            self.network.shared,
            self.network.alias.clone()
        )
    }
}

/// Parameters needed to reach a provisioned (or external) service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>
}

impl ConnectionParams {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            database: None
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// `scheme://[user[:password]@]host:port[/database]`
    pub fn url(&self) -> String {
        self.render(self.password.as_deref())
    }

    fn render(&self, password: Option<&str>) -> String {
        let mut url = format!("{}://", self.scheme);
        if let Some(user) = &self.username {
            url.push_str(user);
            if let Some(password) = password {
                url.push(':');
                url.push_str(password);
            }
            url.push('@');
        }
        url.push_str(&format!("{}:{}", self.host, self.port));
        if let Some(db) = &self.database {
            url.push('/');
            url.push_str(db);
        }
        url
    }
}

impl std::fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = self.password.as_ref().map(|_| "***");
        write!(f, "{}", self.render(redacted))
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}
