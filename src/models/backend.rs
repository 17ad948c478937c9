use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database backend a question is answered against.
///
/// Selected by the caller for every request; nothing in the crate holds a
/// "current" backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Snowflake,
    Redshift,
    Sqlite,
    DuckDb,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Snowflake,
        BackendKind::Redshift,
        BackendKind::Sqlite,
        BackendKind::DuckDb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Snowflake => "snowflake",
            BackendKind::Redshift => "redshift",
            BackendKind::Sqlite => "sqlite",
            BackendKind::DuckDb => "duckdb",
        }
    }

    /// Name shown to users and used in backend hints for SQL generation
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Snowflake => "Snowflake",
            BackendKind::Redshift => "Redshift",
            BackendKind::Sqlite => "SQLite3",
            BackendKind::DuckDb => "DuckDB",
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, BackendKind::Sqlite | BackendKind::DuckDb)
    }

    pub fn profile(&self) -> &'static DialectProfile {
        match self {
            BackendKind::Snowflake => &SNOWFLAKE_PROFILE,
            BackendKind::Redshift => &REDSHIFT_PROFILE,
            BackendKind::Sqlite => &SQLITE_PROFILE,
            BackendKind::DuckDb => &DUCKDB_PROFILE,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported database type: {}", self.0)
    }
}

impl std::error::Error for UnknownBackend {}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snowflake" => Ok(BackendKind::Snowflake),
            "redshift" => Ok(BackendKind::Redshift),
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            "duckdb" => Ok(BackendKind::DuckDb),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// A named connection setting looked up in the backend configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Setting {
    Account,
    User,
    Password,
    Warehouse,
    Database,
    Role,
    Schema,
    Host,
    Port,
    Path,
}

impl Setting {
    pub fn key(&self) -> &'static str {
        match self {
            Setting::Account => "account",
            Setting::User => "user",
            Setting::Password => "password",
            Setting::Warehouse => "warehouse",
            Setting::Database => "database",
            Setting::Role => "role",
            Setting::Schema => "schema",
            Setting::Host => "host",
            Setting::Port => "port",
            Setting::Path => "path",
        }
    }
}

/// One session-setup statement. `{setting}` in the template is replaced by
/// the configured value before the statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupStatement {
    pub template: &'static str,
    pub setting: Setting,
}

impl SetupStatement {
    pub fn render(&self, value: &str) -> String {
        self.template
            .replace(&format!("{{{}}}", self.setting.key()), value)
    }
}

/// SQL dialect used when classifying generated statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Snowflake,
    Redshift,
    Sqlite,
    DuckDb,
}

/// Everything that makes one backend usable: the settings needed to connect
/// and the ordered statements that prepare a fresh session.
#[derive(Debug)]
pub struct DialectProfile {
    pub kind: BackendKind,
    pub setup: &'static [SetupStatement],
    pub required_settings: &'static [Setting],
    pub sql_dialect: SqlDialect,
}

static SNOWFLAKE_PROFILE: DialectProfile = DialectProfile {
    kind: BackendKind::Snowflake,
    setup: &[
        SetupStatement {
            template: "USE ROLE {role}",
            setting: Setting::Role,
        },
        SetupStatement {
            template: "USE DATABASE {database}",
            setting: Setting::Database,
        },
    ],
    required_settings: &[
        Setting::Account,
        Setting::User,
        Setting::Password,
        Setting::Warehouse,
        Setting::Database,
        Setting::Role,
        Setting::Schema,
    ],
    sql_dialect: SqlDialect::Snowflake,
};

static REDSHIFT_PROFILE: DialectProfile = DialectProfile {
    kind: BackendKind::Redshift,
    setup: &[SetupStatement {
        template: "SET search_path TO {schema}",
        setting: Setting::Schema,
    }],
    required_settings: &[
        Setting::Host,
        Setting::Port,
        Setting::Database,
        Setting::User,
        Setting::Password,
        Setting::Schema,
    ],
    sql_dialect: SqlDialect::Redshift,
};

static SQLITE_PROFILE: DialectProfile = DialectProfile {
    kind: BackendKind::Sqlite,
    setup: &[],
    required_settings: &[Setting::Path],
    sql_dialect: SqlDialect::Sqlite,
};

static DUCKDB_PROFILE: DialectProfile = DialectProfile {
    kind: BackendKind::DuckDb,
    setup: &[],
    required_settings: &[Setting::Path],
    sql_dialect: SqlDialect::DuckDb,
};
