//! The revision chain.
//!
//! Tables are declared at their historical shape when created; later
//! revisions evolve them column by column. The head shapes in
//! `catalog::tables` must match the end state of this chain.

use super::ops::DdlOp;
use super::Revision;
use crate::catalog::tables::{
    created_at, id, project_fk, project_fk_column, updated_at, user_fk, user_id,
};
use crate::catalog::{
    ColumnSpec, DefaultValue, ForeignKeySpec, IndexSpec, OnDelete, SemanticType, TableSpec,
    UniqueSpec,
};
use SemanticType::{BigInt, Boolean, Date, Integer, Json, Timestamp};

fn add(table: &'static str, column: ColumnSpec) -> DdlOp {
    DdlOp::AddColumn { table, column }
}

fn add_if_absent(table: &'static str, column: ColumnSpec) -> DdlOp {
    DdlOp::AddColumnIfAbsent { table, column }
}

fn drop_column(table: &'static str, column: &'static str) -> DdlOp {
    DdlOp::DropColumn { table, column }
}

fn alter(table: &'static str, column: ColumnSpec) -> DdlOp {
    DdlOp::AlterColumn { table, column }
}

fn create_index(table: &'static str, index: IndexSpec) -> DdlOp {
    DdlOp::CreateIndex { table, index }
}

fn drop_index(name: &'static str) -> DdlOp {
    DdlOp::DropIndex { name }
}

/// The full chain, oldest first.
pub fn chain() -> Vec<Revision> {
    vec![
        r0001_initial(),
        r603ff68b3523_workspace_tables(),
        r20260107_0001_component_config(),
        r20260109_0001_selected_tools(),
        r20260110_0001_knowledge_source_ids(),
        r80901a5367d7_message_editing(),
        rbilling_tables_001(),
        ranalytics_tables_001(),
        rmissions_tables_001(),
        rembed_fields_001(),
        r20260115_0001_retire_agents(),
        r20260116_0001_mission_templates(),
        r20260117_0001_mission_ui_config(),
        r20260117_0002_mcp_servers(),
        r20260118_0001_mcp_transports(),
        r20260118_0002_mcp_cache(),
        r20260121_0001_user_connections(),
        r20260124_0001_hot_path_indexes(),
        r20260125_1706_purchased_credits(),
        r20260125_1800_auto_top_up(),
        r20260125_2100_mission_plans(),
        r20260216_0001_agent_skills(),
        r20260216_0002_bridge_tokens(),
    ]
}

fn r0001_initial() -> Revision {
    let users = TableSpec::new(
        "users",
        vec![
            id(),
            ColumnSpec::new("clerk_id", SemanticType::text(255)).not_null(),
            ColumnSpec::new("email", SemanticType::text(255)).not_null(),
            ColumnSpec::new("first_name", SemanticType::text(255)),
            ColumnSpec::new("last_name", SemanticType::text(255)),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
            updated_at(),
        ],
    )
    .indexes(vec![
        IndexSpec::unique("ix_users_clerk_id", &["clerk_id"]),
        IndexSpec::unique("ix_users_email", &["email"]),
    ]);

    let agents = legacy_agents_table(false);

    let conversations = TableSpec::new(
        "conversations",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("agent_id", SemanticType::text(36)),
            ColumnSpec::new("langflow_session_id", SemanticType::text(255)),
            ColumnSpec::new("title", SemanticType::text(255)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![
        user_fk(),
        ForeignKeySpec::new("agent_id", "agents", OnDelete::SetNull),
    ])
    .indexes(vec![
        IndexSpec::new("ix_conversations_user_id", &["user_id"]),
        IndexSpec::new("ix_conversations_agent_id", &["agent_id"]),
        IndexSpec::new(
            "ix_conversations_langflow_session_id",
            &["langflow_session_id"],
        ),
    ]);

    let messages = TableSpec::new(
        "messages",
        vec![
            id(),
            ColumnSpec::new("conversation_id", SemanticType::text(36)).not_null(),
            ColumnSpec::new("role", SemanticType::text(20)).not_null(),
            ColumnSpec::new("content", SemanticType::unbounded_text()).not_null(),
            ColumnSpec::new("message_metadata", Json),
            created_at(),
        ],
    )
    .foreign_keys(vec![ForeignKeySpec::new(
        "conversation_id",
        "conversations",
        OnDelete::Cascade,
    )])
    .indexes(vec![IndexSpec::new(
        "ix_messages_conversation_id",
        &["conversation_id"],
    )]);

    Revision {
        id: "0001",
        parent: None,
        label: "initial tables",
        upgrade: vec![
            DdlOp::CreateTable(users),
            DdlOp::CreateTable(agents),
            DdlOp::CreateTable(conversations),
            DdlOp::CreateTable(messages),
        ],
        downgrade: vec![
            DdlOp::DropTable("messages"),
            DdlOp::DropTable("conversations"),
            DdlOp::DropTable("agents"),
            DdlOp::DropTable("users"),
        ],
    }
}

/// Reconstructed from the head data model; see DESIGN.md. Creates the
/// project workspace tables and links conversations to workflows.
fn r603ff68b3523_workspace_tables() -> Revision {
    let projects = TableSpec::new(
        "projects",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("icon", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("folder")),
            ColumnSpec::new("color", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("#f97316")),
            ColumnSpec::new("is_default", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("is_archived", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("sort_order", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![IndexSpec::new("ix_projects_user_id", &["user_id"])]);

    let agent_components = TableSpec::new(
        "agent_components",
        vec![
            id(),
            user_id(),
            project_fk_column(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("icon", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("bot")),
            ColumnSpec::new("color", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("#7C3AED")),
            ColumnSpec::new("avatar_url", SemanticType::text(500)),
            ColumnSpec::new("qa_who", SemanticType::unbounded_text()),
            ColumnSpec::new("qa_rules", SemanticType::unbounded_text()),
            ColumnSpec::new("qa_tricks", SemanticType::unbounded_text()),
            ColumnSpec::new("system_prompt", SemanticType::unbounded_text()),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![
        user_fk(),
        ForeignKeySpec::new("project_id", "projects", OnDelete::Cascade),
    ])
    .indexes(vec![IndexSpec::new(
        "ix_agent_components_user_id",
        &["user_id"],
    )]);

    let workflows = TableSpec::new(
        "workflows",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("langflow_flow_id", SemanticType::text(255)),
            ColumnSpec::new("flow_data", Json),
            ColumnSpec::new("agent_component_ids", Json),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("is_public", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_workflows_user_id", &["user_id"]),
        IndexSpec::new("ix_workflows_langflow_flow_id", &["langflow_flow_id"]),
    ]);

    let user_files = TableSpec::new(
        "user_files",
        vec![
            id(),
            user_id(),
            project_fk_column(),
            ColumnSpec::new("filename", SemanticType::text(255)).not_null(),
            ColumnSpec::new("original_filename", SemanticType::text(255)).not_null(),
            ColumnSpec::new("content_type", SemanticType::text(100)),
            ColumnSpec::new("size", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("storage_path", SemanticType::text(500)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk(), project_fk()])
    .indexes(vec![IndexSpec::new("ix_user_files_user_id", &["user_id"])]);

    let knowledge_sources = TableSpec::new(
        "knowledge_sources",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("source_type", SemanticType::text(50)).not_null(),
            ColumnSpec::new("file_path", SemanticType::text(500)),
            ColumnSpec::new("original_filename", SemanticType::text(255)),
            ColumnSpec::new("mime_type", SemanticType::text(100)),
            ColumnSpec::new("file_size", Integer),
            ColumnSpec::new("url", SemanticType::text(2000)),
            ColumnSpec::new("status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("pending")),
            ColumnSpec::new("error_message", SemanticType::unbounded_text()),
            ColumnSpec::new("collection_id", SemanticType::text(100)),
            ColumnSpec::new("chunk_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("content_preview", SemanticType::unbounded_text()),
            ColumnSpec::new("metadata_json", Json),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_knowledge_sources_user_id", &["user_id"]),
        IndexSpec::new("ix_knowledge_sources_collection_id", &["collection_id"]),
    ]);

    let user_settings = crate::catalog::tables::user_settings();

    Revision {
        id: "603ff68b3523",
        parent: Some("0001"),
        label: "project workspace tables",
        upgrade: vec![
            DdlOp::CreateTable(projects),
            DdlOp::CreateTable(agent_components),
            DdlOp::CreateTable(workflows),
            DdlOp::CreateTable(user_files),
            DdlOp::CreateTable(knowledge_sources),
            DdlOp::CreateTable(user_settings),
            add(
                "conversations",
                ColumnSpec::new("workflow_id", SemanticType::text(36)),
            ),
            create_index(
                "conversations",
                IndexSpec::new("ix_conversations_workflow_id", &["workflow_id"]),
            ),
        ],
        downgrade: vec![
            drop_index("ix_conversations_workflow_id"),
            drop_column("conversations", "workflow_id"),
            DdlOp::DropTable("user_settings"),
            DdlOp::DropTable("knowledge_sources"),
            DdlOp::DropTable("user_files"),
            DdlOp::DropTable("workflows"),
            DdlOp::DropTable("agent_components"),
            DdlOp::DropTable("projects"),
        ],
    }
}

fn r20260107_0001_component_config() -> Revision {
    Revision {
        id: "20260107_0001",
        parent: Some("603ff68b3523"),
        label: "agent component config columns",
        upgrade: vec![
            add("agent_components", ColumnSpec::new("advanced_config", Json)),
            add(
                "agent_components",
                ColumnSpec::new("component_file_path", SemanticType::text(500)),
            ),
            add(
                "agent_components",
                ColumnSpec::new("component_class_name", SemanticType::text(100)),
            ),
            add(
                "agent_components",
                ColumnSpec::new("is_published", Boolean)
                    .not_null()
                    .default_value(DefaultValue::Bool(false)),
            ),
        ],
        downgrade: vec![
            drop_column("agent_components", "is_published"),
            drop_column("agent_components", "component_class_name"),
            drop_column("agent_components", "component_file_path"),
            drop_column("agent_components", "advanced_config"),
        ],
    }
}

fn r20260109_0001_selected_tools() -> Revision {
    Revision {
        id: "20260109_0001",
        parent: Some("20260107_0001"),
        label: "agent component selected tools",
        upgrade: vec![add(
            "agent_components",
            ColumnSpec::new("selected_tools", Json),
        )],
        downgrade: vec![drop_column("agent_components", "selected_tools")],
    }
}

fn r20260110_0001_knowledge_source_ids() -> Revision {
    Revision {
        id: "20260110_0001",
        parent: Some("20260109_0001"),
        label: "agent component knowledge sources",
        upgrade: vec![add(
            "agent_components",
            ColumnSpec::new("knowledge_source_ids", Json),
        )],
        downgrade: vec![drop_column("agent_components", "knowledge_source_ids")],
    }
}

fn r80901a5367d7_message_editing() -> Revision {
    Revision {
        id: "80901a5367d7",
        parent: Some("20260110_0001"),
        label: "message editing and feedback",
        upgrade: vec![
            add(
                "messages",
                ColumnSpec::new("is_edited", Boolean)
                    .not_null()
                    .default_value(DefaultValue::Bool(false)),
            ),
            add("messages", ColumnSpec::new("edited_at", Timestamp)),
            add(
                "messages",
                ColumnSpec::new("original_content", SemanticType::unbounded_text()),
            ),
            add("messages", ColumnSpec::new("feedback", SemanticType::text(20))),
            add("messages", ColumnSpec::new("feedback_at", Timestamp)),
        ],
        downgrade: vec![
            drop_column("messages", "feedback_at"),
            drop_column("messages", "feedback"),
            drop_column("messages", "original_content"),
            drop_column("messages", "edited_at"),
            drop_column("messages", "is_edited"),
        ],
    }
}

fn rbilling_tables_001() -> Revision {
    let subscriptions = TableSpec::new(
        "subscriptions",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("stripe_customer_id", SemanticType::text(255)),
            ColumnSpec::new("stripe_subscription_id", SemanticType::text(255)),
            ColumnSpec::new("plan_id", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("free")),
            ColumnSpec::new("status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("active")),
            ColumnSpec::new("current_period_start", Timestamp),
            ColumnSpec::new("current_period_end", Timestamp),
            ColumnSpec::new("cancel_at_period_end", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::unique("ix_subscriptions_user_id", &["user_id"]),
        IndexSpec::new("ix_subscriptions_stripe_customer_id", &["stripe_customer_id"]),
    ]);

    let billing_events = TableSpec::new(
        "billing_events",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("event_type", SemanticType::text(100)).not_null(),
            ColumnSpec::new("stripe_event_id", SemanticType::text(255)),
            ColumnSpec::new("payload", Json),
            created_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_billing_events_user_id", &["user_id"]),
        IndexSpec::unique("ix_billing_events_stripe_event_id", &["stripe_event_id"]),
    ]);

    Revision {
        id: "billing_tables_001",
        // Recorded parent in the original sources was 603ff68b3523, stale
        // after later insertions; relinked to keep the chain linear.
        parent: Some("80901a5367d7"),
        label: "subscriptions and billing events",
        upgrade: vec![
            DdlOp::CreateTable(subscriptions),
            DdlOp::CreateTable(billing_events),
        ],
        downgrade: vec![
            DdlOp::DropTable("billing_events"),
            DdlOp::DropTable("subscriptions"),
        ],
    }
}

fn ranalytics_tables_001() -> Revision {
    let analytics_daily = TableSpec::new(
        "analytics_daily",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("record_date", Date).not_null(),
            ColumnSpec::new("conversations_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("messages_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("tokens_used", BigInt)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("agents_created", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("agents_active", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("workflows_created", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("workflows_executed", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("avg_response_time_ms", Integer),
            ColumnSpec::new("error_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("breakdown", Json),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .uniques(vec![UniqueSpec::new(
        "uq_analytics_user_date",
        &["user_id", "record_date"],
    )])
    .indexes(vec![IndexSpec::new(
        "ix_analytics_daily_user_date",
        &["user_id", "record_date"],
    )]);

    Revision {
        id: "analytics_tables_001",
        parent: Some("billing_tables_001"),
        label: "daily analytics rollups",
        upgrade: vec![DdlOp::CreateTable(analytics_daily)],
        downgrade: vec![DdlOp::DropTable("analytics_daily")],
    }
}

fn rmissions_tables_001() -> Revision {
    let missions = TableSpec::new(
        "missions",
        vec![
            ColumnSpec::new("id", SemanticType::text(50)).not_null(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("category", SemanticType::text(50)),
            ColumnSpec::new("difficulty", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("beginner")),
            ColumnSpec::new("estimated_minutes", Integer)
                .not_null()
                .default_value(DefaultValue::Int(30)),
            ColumnSpec::new("icon", SemanticType::text(50)),
            ColumnSpec::new("sort_order", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("steps", Json).not_null(),
            ColumnSpec::new("prerequisites", Json),
            ColumnSpec::new("outcomes", Json),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
        ],
    )
    .indexes(vec![
        IndexSpec::new("ix_missions_category", &["category"]),
        IndexSpec::new("ix_missions_sort_order", &["sort_order"]),
    ]);

    let progress = crate::catalog::tables::user_mission_progress();

    Revision {
        id: "missions_tables_001",
        parent: Some("analytics_tables_001"),
        label: "guided missions",
        upgrade: vec![DdlOp::CreateTable(missions), DdlOp::CreateTable(progress)],
        downgrade: vec![
            DdlOp::DropTable("user_mission_progress"),
            DdlOp::DropTable("missions"),
        ],
    }
}

fn rembed_fields_001() -> Revision {
    Revision {
        id: "embed_fields_001",
        parent: Some("missions_tables_001"),
        label: "embeddable agent components",
        upgrade: vec![
            add(
                "agent_components",
                ColumnSpec::new("is_embeddable", Boolean)
                    .not_null()
                    .default_value(DefaultValue::Bool(false)),
            ),
            add("agent_components", ColumnSpec::new("embed_config", Json)),
            add(
                "agent_components",
                ColumnSpec::new("embed_token", SemanticType::text(64)),
            ),
            create_index(
                "agent_components",
                IndexSpec::new("ix_agent_components_embed_token", &["embed_token"]),
            ),
        ],
        downgrade: vec![
            drop_index("ix_agent_components_embed_token"),
            drop_column("agent_components", "embed_token"),
            drop_column("agent_components", "embed_config"),
            drop_column("agent_components", "is_embeddable"),
        ],
    }
}

fn legacy_agents_table(nullable_variant: bool) -> TableSpec {
    let mut name = ColumnSpec::new("name", SemanticType::text(255));
    if !nullable_variant {
        name = name.not_null();
    }
    TableSpec::new(
        "agents",
        vec![
            id(),
            user_id(),
            name,
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("system_prompt", SemanticType::unbounded_text()),
            ColumnSpec::new("langflow_flow_id", SemanticType::text(255)),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_agents_user_id", &["user_id"]),
        IndexSpec::new("ix_agents_langflow_flow_id", &["langflow_flow_id"]),
    ])
}

/// Removes the legacy agents surface. Deleted conversation data is gone for
/// good; the downgrade restores structure only.
fn r20260115_0001_retire_agents() -> Revision {
    Revision {
        id: "20260115_0001",
        parent: Some("embed_fields_001"),
        label: "retire legacy agents",
        upgrade: vec![
            DdlOp::sql(
                "DELETE FROM messages WHERE conversation_id IN \
                 (SELECT id FROM conversations WHERE agent_id IS NOT NULL)",
            ),
            DdlOp::sql("DELETE FROM conversations WHERE agent_id IS NOT NULL"),
            drop_index("ix_conversations_agent_id"),
            drop_column("conversations", "agent_id"),
            DdlOp::DropTable("agents"),
        ],
        downgrade: vec![
            DdlOp::CreateTable(legacy_agents_table(true)),
            add(
                "conversations",
                ColumnSpec::new("agent_id", SemanticType::text(36)),
            ),
            create_index(
                "conversations",
                IndexSpec::new("ix_conversations_agent_id", &["agent_id"]),
            ),
        ],
    }
}

fn r20260116_0001_mission_templates() -> Revision {
    Revision {
        id: "20260116_0001",
        parent: Some("20260115_0001"),
        label: "mission templates and canvas mode",
        upgrade: vec![
            add_if_absent(
                "missions",
                ColumnSpec::new("template_id", SemanticType::text(100)),
            ),
            add_if_absent("missions", ColumnSpec::new("component_pack", Json)),
            add_if_absent(
                "missions",
                ColumnSpec::new("canvas_mode", Boolean)
                    .not_null()
                    .default_value(DefaultValue::Bool(false)),
            ),
        ],
        downgrade: vec![
            drop_column("missions", "canvas_mode"),
            drop_column("missions", "component_pack"),
            drop_column("missions", "template_id"),
        ],
    }
}

fn r20260117_0001_mission_ui_config() -> Revision {
    Revision {
        id: "20260117_0001",
        parent: Some("20260116_0001"),
        label: "mission ui config",
        upgrade: vec![add_if_absent("missions", ColumnSpec::new("ui_config", Json))],
        downgrade: vec![drop_column("missions", "ui_config")],
    }
}

fn r20260117_0002_mcp_servers() -> Revision {
    let mcp_servers = TableSpec::new(
        "mcp_servers",
        vec![
            id(),
            user_id(),
            project_fk_column(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("server_type", SemanticType::text(50)).not_null(),
            ColumnSpec::new("command", SemanticType::text(500)).not_null(),
            ColumnSpec::new("args", Json)
                .not_null()
                .default_value(DefaultValue::EmptyJsonArray),
            ColumnSpec::new("env", Json)
                .not_null()
                .default_value(DefaultValue::EmptyJsonObject),
            ColumnSpec::new("credentials_encrypted", SemanticType::unbounded_text()),
            ColumnSpec::new("is_enabled", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("needs_sync", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("last_health_check", Timestamp),
            ColumnSpec::new("health_status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("unknown")),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk(), project_fk()])
    .indexes(vec![
        IndexSpec::new("ix_mcp_servers_user_id", &["user_id"]),
        IndexSpec::new("ix_mcp_servers_project_id", &["project_id"]),
    ]);

    Revision {
        id: "20260117_0002",
        parent: Some("20260117_0001"),
        label: "mcp servers",
        upgrade: vec![DdlOp::CreateTable(mcp_servers)],
        downgrade: vec![DdlOp::DropTable("mcp_servers")],
    }
}

/// Remote transports. `command` becomes nullable: sse/http servers have a
/// URL instead; the embedded dialect takes the rebuild path for the alter.
fn r20260118_0001_mcp_transports() -> Revision {
    Revision {
        id: "20260118_0001",
        parent: Some("20260117_0002"),
        label: "mcp remote transports",
        upgrade: vec![
            add(
                "mcp_servers",
                ColumnSpec::new("transport", SemanticType::text(20))
                    .not_null()
                    .default_value(DefaultValue::Text("stdio")),
            ),
            add("mcp_servers", ColumnSpec::new("url", SemanticType::text(2000))),
            add(
                "mcp_servers",
                ColumnSpec::new("headers", Json)
                    .not_null()
                    .default_value(DefaultValue::EmptyJsonObject),
            ),
            add(
                "mcp_servers",
                ColumnSpec::new("ssl_verify", Boolean)
                    .not_null()
                    .default_value(DefaultValue::Bool(true)),
            ),
            alter("mcp_servers", ColumnSpec::new("command", SemanticType::text(500))),
        ],
        downgrade: vec![
            drop_column("mcp_servers", "ssl_verify"),
            drop_column("mcp_servers", "headers"),
            drop_column("mcp_servers", "url"),
            drop_column("mcp_servers", "transport"),
            // rows created for remote transports have no command
            DdlOp::sql("UPDATE mcp_servers SET command = '' WHERE command IS NULL"),
            alter(
                "mcp_servers",
                ColumnSpec::new("command", SemanticType::text(500)).not_null(),
            ),
        ],
    }
}

fn r20260118_0002_mcp_cache() -> Revision {
    Revision {
        id: "20260118_0002",
        parent: Some("20260118_0001"),
        label: "mcp response cache flag",
        upgrade: vec![add(
            "mcp_servers",
            ColumnSpec::new("use_cache", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
        )],
        downgrade: vec![drop_column("mcp_servers", "use_cache")],
    }
}

fn r20260121_0001_user_connections() -> Revision {
    let user_connections = TableSpec::new(
        "user_connections",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("app_name", SemanticType::text(100)).not_null(),
            ColumnSpec::new("app_display_name", SemanticType::text(255)),
            ColumnSpec::new("composio_connection_id", SemanticType::text(255)),
            ColumnSpec::new("composio_entity_id", SemanticType::text(255)).not_null(),
            ColumnSpec::new("status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("pending")),
            ColumnSpec::new("account_identifier", SemanticType::text(255)),
            ColumnSpec::new("scopes", Json),
            ColumnSpec::new("available_actions", Json),
            ColumnSpec::new("connected_at", Timestamp),
            ColumnSpec::new("last_used_at", Timestamp),
            ColumnSpec::new("expires_at", Timestamp),
            ColumnSpec::new("last_error", SemanticType::unbounded_text()),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_user_connections_user_id", &["user_id"]),
        IndexSpec::new("ix_user_connections_app_name", &["app_name"]),
        IndexSpec::new(
            "ix_user_connections_composio_connection_id",
            &["composio_connection_id"],
        ),
    ]);

    let unique = UniqueSpec::new(
        "uq_user_connections_user_app_account",
        &["user_id", "app_name", "account_identifier"],
    );

    Revision {
        id: "20260121_0001",
        parent: Some("20260118_0002"),
        label: "external app connections",
        upgrade: vec![
            DdlOp::CreateTable(user_connections),
            DdlOp::CreateUnique {
                table: "user_connections",
                unique: unique.clone(),
            },
        ],
        downgrade: vec![
            DdlOp::DropUnique {
                table: "user_connections",
                unique,
            },
            DdlOp::DropTable("user_connections"),
        ],
    }
}

fn r20260124_0001_hot_path_indexes() -> Revision {
    let indexes: Vec<(&'static str, IndexSpec)> = vec![
        (
            "messages",
            IndexSpec::new(
                "ix_messages_conversation_created",
                &["conversation_id", "created_at"],
            ),
        ),
        (
            "conversations",
            IndexSpec::new("ix_conversations_user_created", &["user_id", "created_at"]),
        ),
        (
            "workflows",
            IndexSpec::new("ix_workflows_user_created", &["user_id", "created_at"]),
        ),
        (
            "workflows",
            IndexSpec::new("ix_workflows_user_langflow", &["user_id", "langflow_flow_id"]),
        ),
        (
            "agent_components",
            IndexSpec::new(
                "ix_agent_components_user_created",
                &["user_id", "created_at"],
            ),
        ),
        (
            "agent_components",
            IndexSpec::new(
                "ix_agent_components_user_published",
                &["user_id", "is_published"],
            ),
        ),
        (
            "knowledge_sources",
            IndexSpec::new(
                "ix_knowledge_sources_user_created",
                &["user_id", "created_at"],
            ),
        ),
        (
            "billing_events",
            IndexSpec::new("ix_billing_events_user_created", &["user_id", "created_at"]),
        ),
        (
            "projects",
            IndexSpec::new("ix_projects_user_sort", &["user_id", "sort_order"]),
        ),
        (
            "mcp_servers",
            IndexSpec::new("ix_mcp_servers_user_created", &["user_id", "created_at"]),
        ),
        (
            "user_connections",
            IndexSpec::new("ix_user_connections_user_status", &["user_id", "status"]),
        ),
    ];

    let upgrade = indexes
        .iter()
        .cloned()
        .map(|(table, index)| create_index(table, index))
        .collect();
    let downgrade = indexes
        .iter()
        .rev()
        .map(|(_, index)| drop_index(index.name))
        .collect();

    Revision {
        id: "20260124_0001",
        parent: Some("20260121_0001"),
        label: "hot path composite indexes",
        upgrade,
        downgrade,
    }
}

fn r20260125_1706_purchased_credits() -> Revision {
    Revision {
        id: "20260125_1706",
        parent: Some("20260124_0001"),
        label: "purchased credit balance",
        upgrade: vec![add(
            "subscriptions",
            ColumnSpec::new("purchased_credits", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
        )],
        downgrade: vec![drop_column("subscriptions", "purchased_credits")],
    }
}

fn r20260125_1800_auto_top_up() -> Revision {
    let columns = vec![
        ColumnSpec::new("auto_top_up_enabled", Boolean)
            .not_null()
            .default_value(DefaultValue::Bool(false)),
        ColumnSpec::new("auto_top_up_threshold", Integer)
            .not_null()
            .default_value(DefaultValue::Int(100)),
        ColumnSpec::new("auto_top_up_pack_id", SemanticType::text(50))
            .not_null()
            .default_value(DefaultValue::Text("credits_5500")),
        ColumnSpec::new("auto_top_up_max_monthly", Integer)
            .not_null()
            .default_value(DefaultValue::Int(3)),
        ColumnSpec::new("auto_top_ups_this_month", Integer)
            .not_null()
            .default_value(DefaultValue::Int(0)),
        ColumnSpec::new("spend_cap_enabled", Boolean)
            .not_null()
            .default_value(DefaultValue::Bool(false)),
        ColumnSpec::new("spend_cap_amount_cents", Integer)
            .not_null()
            .default_value(DefaultValue::Int(10000)),
        ColumnSpec::new("spend_this_month_cents", Integer)
            .not_null()
            .default_value(DefaultValue::Int(0)),
    ];

    let upgrade = columns
        .iter()
        .cloned()
        .map(|column| add("subscriptions", column))
        .collect();
    let downgrade = vec![
        drop_column("subscriptions", "spend_this_month_cents"),
        drop_column("subscriptions", "spend_cap_amount_cents"),
        drop_column("subscriptions", "spend_cap_enabled"),
        drop_column("subscriptions", "auto_top_ups_this_month"),
        drop_column("subscriptions", "auto_top_up_max_monthly"),
        drop_column("subscriptions", "auto_top_up_pack_id"),
        drop_column("subscriptions", "auto_top_up_threshold"),
        drop_column("subscriptions", "auto_top_up_enabled"),
    ];

    Revision {
        id: "20260125_1800",
        parent: Some("20260125_1706"),
        label: "auto top-up and spend caps",
        upgrade,
        downgrade,
    }
}

fn r20260125_2100_mission_plans() -> Revision {
    Revision {
        id: "20260125_2100",
        parent: Some("20260125_1800"),
        label: "plan-gated missions",
        upgrade: vec![
            add(
                "missions",
                ColumnSpec::new("required_plan", SemanticType::text(20))
                    .not_null()
                    .default_value(DefaultValue::Text("free")),
            ),
            DdlOp::sql(
                "UPDATE missions SET required_plan = 'individual' \
                 WHERE id NOT IN ('L001-hello-charlie', 'L002-faq-bot-v1')",
            ),
        ],
        downgrade: vec![drop_column("missions", "required_plan")],
    }
}

fn r20260216_0001_agent_skills() -> Revision {
    Revision {
        id: "20260216_0001",
        parent: Some("20260125_2100"),
        label: "workflows as agent skills",
        upgrade: vec![add(
            "workflows",
            ColumnSpec::new("is_agent_skill", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
        )],
        downgrade: vec![drop_column("workflows", "is_agent_skill")],
    }
}

fn r20260216_0002_bridge_tokens() -> Revision {
    Revision {
        id: "20260216_0002",
        parent: Some("20260216_0001"),
        label: "user mcp bridge tokens",
        upgrade: vec![
            add(
                "users",
                ColumnSpec::new("mcp_bridge_token", SemanticType::text(255)),
            ),
            create_index(
                "users",
                IndexSpec::unique("ix_users_mcp_bridge_token", &["mcp_bridge_token"]),
            ),
        ],
        downgrade: vec![
            drop_index("ix_users_mcp_bridge_token"),
            drop_column("users", "mcp_bridge_token"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_length_and_order() {
        let chain = chain();
        assert_eq!(chain.len(), 23);
        assert_eq!(chain.first().unwrap().id, "0001");
        assert_eq!(chain.last().unwrap().id, "20260216_0002");
    }

    #[test]
    fn test_every_revision_is_reversible() {
        for revision in chain() {
            assert!(
                !revision.upgrade.is_empty(),
                "revision {} has no upgrade steps",
                revision.id
            );
            assert!(
                !revision.downgrade.is_empty(),
                "revision {} has no downgrade steps",
                revision.id
            );
        }
    }

    #[test]
    fn test_relinked_parent() {
        let chain = chain();
        let billing = chain.iter().find(|r| r.id == "billing_tables_001").unwrap();
        assert_eq!(billing.parent, Some("80901a5367d7"));
        let reconstructed = chain.iter().find(|r| r.id == "603ff68b3523").unwrap();
        assert_eq!(reconstructed.parent, Some("0001"));
    }
}
