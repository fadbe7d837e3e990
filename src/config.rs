use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Deployment identity echoed in every response.
    pub server_number: String,
    pub database: DatabaseConfig,
    pub objects: ObjectStoreConfig,
    pub max_upload_bytes: usize,
}

/// Which relational backend variant to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Sqlite { path: PathBuf },
    MySql(MySqlConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, PartialEq, Eq)]
pub struct MySqlConfig {
    pub primary: HostPort,
    pub replica: HostPort,
    pub user: String,
    pub password: String,
    pub database: String,
    pub write_pool_size: u32,
    pub read_pool_size: u32,
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("primary", &self.primary)
            .field("replica", &self.replica)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("write_pool_size", &self.write_pool_size)
            .field("read_pool_size", &self.read_pool_size)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreConfig {
    Local { root: PathBuf },
    Http { endpoint: String, bucket: String },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Record service with replicated storage and blob cleanup")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Deployment identity (overrides SERVER_NUMBER)
    #[arg(long)]
    pub server_number: Option<String>,

    /// `sqlite` or `mysql` (overrides DB_DRIVER)
    #[arg(long)]
    pub db_driver: Option<String>,

    /// SQLite database file (overrides SQLITE_PATH)
    #[arg(long)]
    pub sqlite_path: Option<PathBuf>,

    /// Directory for the local object store (overrides UPLOADS_DIR)
    #[arg(long)]
    pub uploads_dir: Option<PathBuf>,

    /// Create the schema on the write target and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values found through `lookup`, then defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = EnvSource { lookup };

        let driver = args
            .db_driver
            .unwrap_or_else(|| vars.string("DB_DRIVER", "sqlite"))
            .to_ascii_lowercase();

        let database = match driver.as_str() {
            "sqlite" => DatabaseConfig::Sqlite {
                path: args
                    .sqlite_path
                    .unwrap_or_else(|| vars.string("SQLITE_PATH", "./data/app.db").into()),
            },
            "mysql" => {
                let primary = HostPort {
                    host: vars.string("MYSQL_HOST", "127.0.0.1"),
                    port: vars.parse("MYSQL_PORT", 3306)?,
                };
                let replica = HostPort {
                    host: vars.string("MYSQL_REPLICA_HOST", &primary.host),
                    port: vars.parse("MYSQL_REPLICA_PORT", primary.port)?,
                };
                DatabaseConfig::MySql(MySqlConfig {
                    primary,
                    replica,
                    user: vars.string("MYSQL_USER", "root"),
                    password: vars.string("MYSQL_PASSWORD", ""),
                    database: vars.string("MYSQL_DATABASE", "cloud_app"),
                    write_pool_size: vars.parse("WRITE_POOL_SIZE", 5)?,
                    read_pool_size: vars.parse("READ_POOL_SIZE", 10)?,
                })
            }
            other => bail!("unsupported DB_DRIVER `{}` (expected sqlite or mysql)", other),
        };

        let store = vars.string("OBJECT_STORE", "local").to_ascii_lowercase();
        let objects = match store.as_str() {
            "local" => ObjectStoreConfig::Local {
                root: args
                    .uploads_dir
                    .unwrap_or_else(|| vars.string("UPLOADS_DIR", "./uploads").into()),
            },
            "http" => ObjectStoreConfig::Http {
                endpoint: vars
                    .get("OBJECT_STORE_ENDPOINT")
                    .context("OBJECT_STORE=http requires OBJECT_STORE_ENDPOINT")?,
                bucket: vars.string("OBJECT_STORE_BUCKET", "uploads"),
            },
            other => bail!("unsupported OBJECT_STORE `{}` (expected local or http)", other),
        };

        Ok(Self {
            host: args.host.unwrap_or_else(|| vars.string("HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => vars.parse("PORT", 8000)?,
            },
            server_number: args
                .server_number
                .unwrap_or_else(|| vars.string("SERVER_NUMBER", "1")),
            database,
            objects,
            max_upload_bytes: vars.parse("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(name) {
            Some(value) => value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value)),
            None => Ok(default),
        }
    }
}
