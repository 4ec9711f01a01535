//! Command-line client for a StrataDB node.
//!
//! Login state (identity id + session token) lives under `~/.stratadb`,
//! so authenticated commands work across invocations until the session
//! expires.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stratadb::error::{StrataDbError, StrataDbResult};
use stratadb::permissions::{PermissionAudience, PermissionGrant, PermissionLevel};
use stratadb::protocol::messages::{
    DataPair, NewSubIdentityRequest, SubIdentityModify, TableCreate, TableDataFormat,
};
use stratadb::query::parse_query;
use stratadb::StrataClient;

#[derive(Parser, Debug)]
#[command(name = "stratadb", about = "StrataDB command-line client", version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = stratadb::constants::DEFAULT_LISTEN_ADDRESS)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show server version information
    Version,
    /// Register a new primary identity
    Register {
        handle: String,
        email: String,
        mobile: String,
        password: String,
    },
    /// Confirm a registration with its verification code
    Confirm {
        id: String,
        code: String,
        /// Owner id when confirming a sub-identity
        #[arg(long, default_value = "")]
        parent: String,
    },
    /// Log in and store the session locally
    Login {
        handle: String,
        password: String,
        /// Owner id when logging in as a sub-identity
        #[arg(long, default_value = "")]
        parent: String,
    },
    /// Create a table in your namespace
    CreateTable {
        table: String,
        /// json, plain_text, or binary
        #[arg(long, default_value = "json")]
        format: String,
        /// Reject session-token callers on this table's data paths
        #[arg(long)]
        require_signature: bool,
    },
    /// List tables visible to you
    Ls {
        /// Namespace to list; defaults to your own
        #[arg(long)]
        owner: Option<String>,
    },
    /// Write a value
    Put {
        owner: String,
        table: String,
        key: String,
        value: String,
        /// Fail instead of overwriting an existing key
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Write several key=value pairs atomically
    PutMulti {
        owner: String,
        table: String,
        /// key=value pairs
        pairs: Vec<String>,
    },
    /// Read one or more keys
    Get {
        owner: String,
        table: String,
        keys: Vec<String>,
        #[arg(long, default_value_t = 0)]
        page: u64,
    },
    /// List keys matching a pattern ("" lists all, "p%" is a prefix scan)
    Keys {
        owner: String,
        table: String,
        #[arg(default_value = "")]
        pattern: String,
        #[arg(long, default_value_t = 0)]
        page: u64,
    },
    /// Run a field query against a JSON table
    Query {
        owner: String,
        table: String,
        /// e.g. 'age >= 21 and city = "berlin"'
        expr: String,
        #[arg(long, default_value_t = 0)]
        page: u64,
    },
    /// Delete a key
    Rm {
        owner: String,
        table: String,
        key: String,
    },
    /// Delete a table and everything in it
    RmTable { owner: String, table: String },
    /// Grant access on one of your tables
    Grant {
        table: String,
        /// public, sub_users, or an identity id
        audience: String,
        /// read, write, or admin
        level: String,
        /// Restrict the grant to keys matching this pattern
        #[arg(long)]
        key_pattern: Option<String>,
    },
    /// Sub-identity management
    #[command(subcommand)]
    Subid(SubidCommand),
}

#[derive(Subcommand, Debug)]
enum SubidCommand {
    /// Create a sub-identity under your identity
    New {
        handle: String,
        email: String,
        mobile: String,
        password: String,
        #[arg(long)]
        signup_code: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// List your sub-identities
    Ls,
    /// Modify one of your sub-identities
    Mod {
        sub_id: String,
        #[arg(long)]
        handle: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CliState {
    #[serde(default)]
    identity_id: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
}

fn state_path() -> StrataDbResult<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        StrataDbError::InvalidArgument("Cannot determine the home directory".to_string())
    })?;
    Ok(home.join(".stratadb").join("session.json"))
}

fn load_state() -> StrataDbResult<CliState> {
    let path = state_path()?;
    match std::fs::read_to_string(&path) {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CliState::default()),
        Err(e) => Err(e.into()),
    }
}

fn save_state(state: &CliState) -> StrataDbResult<()> {
    let path = state_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_vec_pretty(state)?)?;
    Ok(())
}

fn parse_level(level: &str) -> StrataDbResult<PermissionLevel> {
    match level {
        "read" => Ok(PermissionLevel::Read),
        "write" => Ok(PermissionLevel::Write),
        "admin" => Ok(PermissionLevel::Admin),
        other => Err(StrataDbError::InvalidArgument(format!(
            "Unknown level: {} (expected read, write, or admin)",
            other
        ))),
    }
}

fn parse_audience(audience: &str) -> PermissionAudience {
    match audience {
        "public" => PermissionAudience::Public,
        "sub_users" => PermissionAudience::SubUsers,
        id => PermissionAudience::Individual(id.to_string()),
    }
}

fn parse_format(format: &str) -> StrataDbResult<TableDataFormat> {
    match format {
        "json" => Ok(TableDataFormat::Json),
        "plain_text" => Ok(TableDataFormat::PlainText),
        "binary" => Ok(TableDataFormat::Binary),
        other => Err(StrataDbError::InvalidArgument(format!(
            "Unknown format: {} (expected json, plain_text, or binary)",
            other
        ))),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> StrataDbResult<()> {
    let mut client = StrataClient::connect(&args.server).await?;
    let state = load_state()?;
    if let Some(token) = &state.session_token {
        client.set_session_token(token.clone());
    }

    match args.command {
        Command::Version => {
            let version = client.version_info().await?;
            println!(
                "server {} (protocol {}, min client {})",
                version.server_version, version.protocol_version, version.min_client_version
            );
        }
        Command::Register {
            handle,
            email,
            mobile,
            password,
        } => {
            let id = client
                .register(&handle, &email, &mobile, &password, None)
                .await?;
            println!("pending identity {}", id);
            println!("confirm with: stratadb confirm {} <code>", id);
        }
        Command::Confirm { id, code, parent } => {
            client.confirm(&id, &parent, &code).await?;
            println!("confirmed {}", id);
        }
        Command::Login {
            handle,
            password,
            parent,
        } => {
            let response = client.login(&parent, &handle, &password).await?;
            save_state(&CliState {
                identity_id: Some(response.id.clone()),
                session_token: Some(response.session_token),
            })?;
            println!("logged in as {} (expires {})", response.id, response.expires_at);
        }
        Command::CreateTable {
            table,
            format,
            require_signature,
        } => {
            client
                .create_table(TableCreate {
                    credential: None,
                    table: table.clone(),
                    data_format: parse_format(&format)?,
                    indexed_fields: Vec::new(),
                    allow_token_auth: !require_signature,
                    permissions: Vec::new(),
                })
                .await?;
            println!("created table {}", table);
        }
        Command::Ls { owner } => {
            for table in client.list_tables(owner.as_deref()).await? {
                println!(
                    "{}/{}\t{:?}\t{}",
                    table.owner_id,
                    table.table,
                    table.data_format,
                    table.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Command::Put {
            owner,
            table,
            key,
            value,
            no_overwrite,
        } => {
            client
                .put(&owner, &table, &key, value.into_bytes(), !no_overwrite)
                .await?;
            println!("ok");
        }
        Command::PutMulti {
            owner,
            table,
            pairs,
        } => {
            let mut data = Vec::new();
            for pair in &pairs {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    StrataDbError::InvalidArgument(format!("Expected key=value, got {}", pair))
                })?;
                data.push(DataPair {
                    key: key.to_string(),
                    value: value.as_bytes().to_vec(),
                });
            }
            let count = data.len();
            client.put_multi(&owner, &table, data, true).await?;
            println!("wrote {} pairs", count);
        }
        Command::Get {
            owner,
            table,
            keys,
            page,
        } => {
            let response = client.get(&owner, &table, keys, page, None).await?;
            print_pairs(&response.pairs, response.has_next_page);
        }
        Command::Keys {
            owner,
            table,
            pattern,
            page,
        } => {
            let response = client.list_keys(&owner, &table, &pattern, page, None).await?;
            for key in &response.keys {
                println!("{}", key);
            }
            if response.has_next_page {
                println!("... more (use --page {})", page + 1);
            }
        }
        Command::Query {
            owner,
            table,
            expr,
            page,
        } => {
            let query = parse_query(&expr)?;
            let response = client.query(&owner, &table, query, page, None).await?;
            print_pairs(&response.pairs, response.has_next_page);
        }
        Command::Rm { owner, table, key } => {
            client.delete_key(&owner, &table, &key).await?;
            println!("deleted {}", key);
        }
        Command::RmTable { owner, table } => {
            client.delete_table(&owner, &table).await?;
            println!("deleted table {}", table);
        }
        Command::Grant {
            table,
            audience,
            level,
            key_pattern,
        } => {
            let owner = state.identity_id.clone().ok_or_else(|| {
                StrataDbError::Unauthorized("Log in before granting permissions".to_string())
            })?;
            client
                .set_permission(
                    &owner,
                    &table,
                    PermissionGrant {
                        audience: parse_audience(&audience),
                        level: parse_level(&level)?,
                        key_constraint: key_pattern,
                    },
                )
                .await?;
            println!("granted {} on {}", level, table);
        }
        Command::Subid(cmd) => match cmd {
            SubidCommand::New {
                handle,
                email,
                mobile,
                password,
                signup_code,
                group,
            } => {
                let id = client
                    .create_sub_identity(NewSubIdentityRequest {
                        credential: None,
                        handle,
                        email,
                        mobile,
                        password,
                        public_key: None,
                        signup_code,
                        group_id: group,
                    })
                    .await?;
                println!("pending sub-identity {}", id);
            }
            SubidCommand::Ls => {
                for sub in client.list_sub_identities().await? {
                    println!("{}\t{}\t{}", sub.id, sub.handle, sub.email);
                }
            }
            SubidCommand::Mod {
                sub_id,
                handle,
                email,
                mobile,
                password,
                group,
            } => {
                client
                    .modify_sub_identity(SubIdentityModify {
                        credential: None,
                        sub_id: sub_id.clone(),
                        new_handle: handle,
                        new_email: email,
                        new_mobile: mobile,
                        new_password: password,
                        new_public_key: None,
                        new_group_id: group,
                    })
                    .await?;
                println!("modified {}", sub_id);
            }
        },
    }
    Ok(())
}

fn print_pairs(pairs: &[DataPair], has_next_page: bool) {
    for pair in pairs {
        match std::str::from_utf8(&pair.value) {
            Ok(text) => println!("{}\t{}", pair.key, text),
            Err(_) => println!("{}\t<{} binary bytes>", pair.key, pair.value.len()),
        }
    }
    if has_next_page {
        println!("... more pages available");
    }
}
