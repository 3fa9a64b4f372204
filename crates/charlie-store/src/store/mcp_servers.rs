//! MCP server registrations.
//!
//! A server is reached either through a local stdio command or a remote
//! sse/http endpoint; the transport decides which connection fields are
//! mandatory. Credentials are encrypted before they touch the database and
//! only decrypted for the owning user.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

pub const TRANSPORTS: &[&str] = &["stdio", "sse", "http"];

#[derive(Debug, Clone)]
pub struct McpServer {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub server_type: String,
    pub transport: String,
    pub command: Option<String>,
    pub args: JsonValue,
    pub env: JsonValue,
    pub url: Option<String>,
    pub headers: JsonValue,
    pub ssl_verify: bool,
    pub use_cache: bool,
    /// Decrypted credential blob, present only on owner reads.
    pub credentials: Option<String>,
    pub is_enabled: bool,
    pub needs_sync: bool,
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMcpServer {
    pub project_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub server_type: String,
    pub transport: String,
    pub command: Option<String>,
    pub args: Option<JsonValue>,
    pub env: Option<JsonValue>,
    pub url: Option<String>,
    pub headers: Option<JsonValue>,
    pub ssl_verify: bool,
    pub use_cache: bool,
    pub credentials: Option<String>,
}

impl Default for NewMcpServer {
    fn default() -> Self {
        Self {
            project_id: None,
            name: String::new(),
            description: None,
            server_type: "custom".to_string(),
            transport: "stdio".to_string(),
            command: None,
            args: None,
            env: None,
            url: None,
            headers: None,
            ssl_verify: true,
            use_cache: false,
            credentials: None,
        }
    }
}

/// Partial update; None leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct McpServerUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub transport: Option<String>,
    pub command: Option<Option<String>>,
    pub args: Option<JsonValue>,
    pub env: Option<JsonValue>,
    pub url: Option<Option<String>>,
    pub headers: Option<JsonValue>,
    pub ssl_verify: Option<bool>,
    pub use_cache: Option<bool>,
    pub credentials: Option<Option<String>>,
}

fn check_transport(transport: &str, command: Option<&str>, url: Option<&str>) -> Result<()> {
    if !TRANSPORTS.contains(&transport) {
        return Err(StoreError::validation(format!(
            "unknown transport: {}",
            transport
        )));
    }
    match transport {
        "stdio" => {
            if command.map_or(true, |c| c.trim().is_empty()) {
                return Err(StoreError::validation(
                    "stdio servers require a command",
                ));
            }
        }
        _ => {
            if url.map_or(true, |u| u.trim().is_empty()) {
                return Err(StoreError::validation(format!(
                    "{} servers require a url",
                    transport
                )));
            }
        }
    }
    Ok(())
}

fn check_args(args: &JsonValue) -> Result<()> {
    match args {
        JsonValue::Array(items) if items.iter().all(JsonValue::is_string) => Ok(()),
        _ => Err(StoreError::validation("args must be an array of strings")),
    }
}

fn check_string_map(value: &JsonValue, field: &str) -> Result<()> {
    match value {
        JsonValue::Object(map) if map.values().all(JsonValue::is_string) => Ok(()),
        _ => Err(StoreError::validation(format!(
            "{} must be an object of string values",
            field
        ))),
    }
}

const SERVER_COLUMNS: &str = "id, user_id, project_id, name, description, server_type, transport, \
     command, args, env, url, headers, ssl_verify, use_cache, \
     credentials_encrypted, is_enabled, needs_sync, last_health_check, \
     health_status, created_at, updated_at";

impl Store {
    fn row_to_server(&self, row: &DbRow) -> Result<McpServer> {
        let credentials = match row.get_opt_text("credentials_encrypted")? {
            Some(payload) => Some(self.cipher()?.decrypt(&payload)?),
            None => None,
        };
        Ok(McpServer {
            id: row.get_text("id")?,
            user_id: row.get_text("user_id")?,
            project_id: row.get_opt_text("project_id")?,
            name: row.get_text("name")?,
            description: row.get_opt_text("description")?,
            server_type: row.get_text("server_type")?,
            transport: row.get_text("transport")?,
            command: row.get_opt_text("command")?,
            args: row
                .get_opt_json("args")?
                .unwrap_or_else(|| JsonValue::Array(Vec::new())),
            env: row
                .get_opt_json("env")?
                .unwrap_or_else(|| JsonValue::Object(Default::default())),
            url: row.get_opt_text("url")?,
            headers: row
                .get_opt_json("headers")?
                .unwrap_or_else(|| JsonValue::Object(Default::default())),
            ssl_verify: row.get_bool("ssl_verify")?,
            use_cache: row.get_bool("use_cache")?,
            credentials,
            is_enabled: row.get_bool("is_enabled")?,
            needs_sync: row.get_bool("needs_sync")?,
            last_health_check: row.get_opt_timestamp("last_health_check")?,
            health_status: row.get_text("health_status")?,
            created_at: row.get_timestamp("created_at")?,
            updated_at: row.get_timestamp("updated_at")?,
        })
    }

    pub async fn create_mcp_server(
        &self,
        ctx: &RequestContext,
        new: NewMcpServer,
    ) -> Result<McpServer> {
        ctx.guard("create_mcp_server", async {
            if new.name.trim().is_empty() {
                return Err(StoreError::validation("server name is required"));
            }
            check_transport(&new.transport, new.command.as_deref(), new.url.as_deref())?;
            let args = sanitize::clean_json(new.args.unwrap_or_else(|| serde_json::json!([])));
            check_args(&args)?;
            let env = sanitize::clean_json(new.env.unwrap_or_else(|| serde_json::json!({})));
            check_string_map(&env, "env")?;
            let headers =
                sanitize::clean_json(new.headers.unwrap_or_else(|| serde_json::json!({})));
            check_string_map(&headers, "headers")?;
            if let Some(project_id) = &new.project_id {
                self.get_project_unguarded(ctx, project_id).await?;
            }
            let credentials_encrypted = match &new.credentials {
                Some(plain) => Some(self.cipher()?.encrypt(plain)?),
                None => None,
            };

            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO mcp_servers (id, user_id, project_id, name, description, \
                                 server_type, transport, command, args, env, url, headers, \
                                 ssl_verify, use_cache, credentials_encrypted, is_enabled, \
                                 needs_sync, health_status, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                         RETURNING {}",
                        SERVER_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.project_id),
                        Value::from(new.name.trim()),
                        Value::from(new.description),
                        Value::from(new.server_type.as_str()),
                        Value::from(new.transport.as_str()),
                        Value::from(new.command),
                        Value::from(args),
                        Value::from(env),
                        Value::from(new.url),
                        Value::from(headers),
                        Value::from(new.ssl_verify),
                        Value::from(new.use_cache),
                        Value::from(credentials_encrypted),
                        Value::from(true),
                        Value::from(true),
                        Value::from("unknown"),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            self.row_to_server(&row)
        })
        .await
    }

    pub async fn get_mcp_server(&self, ctx: &RequestContext, server_id: &str) -> Result<McpServer> {
        ctx.guard("get_mcp_server", async {
            self.fetch_server(ctx, server_id).await
        })
        .await
    }

    /// Newest first; optionally narrowed to one project.
    pub async fn list_mcp_servers(
        &self,
        ctx: &RequestContext,
        project_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<McpServer>> {
        ctx.guard("list_mcp_servers", async {
            let sql = format!(
                "SELECT {} FROM mcp_servers WHERE user_id = ?{} \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                SERVER_COLUMNS,
                if project_id.is_some() {
                    " AND project_id = ?"
                } else {
                    ""
                }
            );
            let mut params = vec![Value::from(ctx.user_id.as_str())];
            if let Some(project_id) = project_id {
                params.push(Value::from(project_id));
            }
            params.push(Value::from(page.limit()));
            params.push(Value::from(page.offset()));

            let rows = self.pool().fetch_all(&sql, &params).await?;
            rows.iter().map(|row| self.row_to_server(row)).collect()
        })
        .await
    }

    pub async fn update_mcp_server(
        &self,
        ctx: &RequestContext,
        server_id: &str,
        update: McpServerUpdate,
    ) -> Result<McpServer> {
        ctx.guard("update_mcp_server", async {
            let mut server = self.fetch_server(ctx, server_id).await?;
            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(StoreError::validation("server name is required"));
                }
                server.name = name.trim().to_string();
            }
            if let Some(v) = update.description {
                server.description = v;
            }
            if let Some(v) = update.transport {
                server.transport = v;
            }
            if let Some(v) = update.command {
                server.command = v;
            }
            if let Some(v) = update.args {
                let v = sanitize::clean_json(v);
                check_args(&v)?;
                server.args = v;
            }
            if let Some(v) = update.env {
                let v = sanitize::clean_json(v);
                check_string_map(&v, "env")?;
                server.env = v;
            }
            if let Some(v) = update.url {
                server.url = v;
            }
            if let Some(v) = update.headers {
                let v = sanitize::clean_json(v);
                check_string_map(&v, "headers")?;
                server.headers = v;
            }
            if let Some(v) = update.ssl_verify {
                server.ssl_verify = v;
            }
            if let Some(v) = update.use_cache {
                server.use_cache = v;
            }
            if let Some(v) = update.credentials {
                server.credentials = v;
            }
            // the merged shape must still be a valid transport config
            check_transport(
                &server.transport,
                server.command.as_deref(),
                server.url.as_deref(),
            )?;

            let credentials_encrypted = match &server.credentials {
                Some(plain) => Some(self.cipher()?.encrypt(plain)?),
                None => None,
            };
            server.needs_sync = true;
            server.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE mcp_servers SET name = ?, description = ?, transport = ?, \
                             command = ?, args = ?, env = ?, url = ?, headers = ?, \
                             ssl_verify = ?, use_cache = ?, credentials_encrypted = ?, \
                             needs_sync = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(server.name.as_str()),
                        Value::from(server.description.clone()),
                        Value::from(server.transport.as_str()),
                        Value::from(server.command.clone()),
                        Value::from(server.args.clone()),
                        Value::from(server.env.clone()),
                        Value::from(server.url.clone()),
                        Value::from(server.headers.clone()),
                        Value::from(server.ssl_verify),
                        Value::from(server.use_cache),
                        Value::from(credentials_encrypted),
                        Value::from(true),
                        Value::from(server.updated_at),
                        Value::from(server_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(server)
        })
        .await
    }

    pub async fn set_mcp_server_enabled(
        &self,
        ctx: &RequestContext,
        server_id: &str,
        enabled: bool,
    ) -> Result<()> {
        ctx.guard("set_mcp_server_enabled", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE mcp_servers SET is_enabled = ?, needs_sync = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(enabled),
                        Value::from(true),
                        Value::from(now()),
                        Value::from(server_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("mcp server", server_id));
            }
            Ok(())
        })
        .await
    }

    /// Record the outcome of a health probe.
    pub async fn record_mcp_server_health(
        &self,
        ctx: &RequestContext,
        server_id: &str,
        status: &str,
    ) -> Result<()> {
        ctx.guard("record_mcp_server_health", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE mcp_servers SET health_status = ?, last_health_check = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(status),
                        Value::from(now()),
                        Value::from(now()),
                        Value::from(server_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("mcp server", server_id));
            }
            Ok(())
        })
        .await
    }

    /// The bridge calls this after pushing the config downstream.
    pub async fn mark_mcp_server_synced(
        &self,
        ctx: &RequestContext,
        server_id: &str,
    ) -> Result<()> {
        ctx.guard("mark_mcp_server_synced", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE mcp_servers SET needs_sync = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(false),
                        Value::from(now()),
                        Value::from(server_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("mcp server", server_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_mcp_server(&self, ctx: &RequestContext, server_id: &str) -> Result<()> {
        ctx.guard("delete_mcp_server", async {
            let affected = self
                .pool()
                .execute(
                    "DELETE FROM mcp_servers WHERE id = ? AND user_id = ?",
                    &[Value::from(server_id), Value::from(ctx.user_id.as_str())],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("mcp server", server_id));
            }
            Ok(())
        })
        .await
    }

    async fn fetch_server(&self, ctx: &RequestContext, server_id: &str) -> Result<McpServer> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM mcp_servers WHERE id = ? AND user_id = ?",
                    SERVER_COLUMNS
                ),
                &[Value::from(server_id), Value::from(ctx.user_id.as_str())],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("mcp server", server_id))?;
        self.row_to_server(&row)
    }
}
