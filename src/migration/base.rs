//! The built-in migration chain that establishes the system tables.

use super::unit::{MigrationUnit, StructuralMigration};
use crate::physical::{ColumnDefinition, TableDefinition};
use crate::schema::types::DataType;
use serde_json::json;

fn string(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::String).max_length(255)
}

fn required_string(name: &str) -> ColumnDefinition {
    string(name).not_null()
}

fn flag(name: &str, default: bool) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Boolean)
        .not_null()
        .default_value(json!(default))
}

fn roles_and_users() -> StructuralMigration {
    StructuralMigration::new(1, "create_roles_and_users")
        .create_table(
            TableDefinition::system("roles")
                .with_column(required_string("name").unique())
                .with_column(ColumnDefinition::new("description", DataType::Text))
                .with_column(string("icon"))
                .with_column(flag("admin_access", false))
                .with_column(flag("app_access", true)),
        )
        .create_table(
            TableDefinition::system("users")
                .with_column(required_string("email").unique())
                .with_column(required_string("password"))
                .with_column(string("first_name"))
                .with_column(string("last_name"))
                .with_column(string("avatar"))
                .with_column(string("language").default_value(json!("en-US")))
                .with_column(string("theme").default_value(json!("auto")))
                .with_column(
                    required_string("status")
                        .max_length(16)
                        .default_value(json!("active")),
                )
                .with_column(
                    ColumnDefinition::new("role", DataType::Uuid)
                        .not_null()
                        .references("roles", "id"),
                )
                .with_column(ColumnDefinition::new("last_access", DataType::DateTime))
                .with_column(string("last_page"))
                .with_column(string("provider").default_value(json!("default")))
                .with_column(string("external_identifier"))
                .with_column(flag("email_notifications", true))
                .with_column(ColumnDefinition::new("tags", DataType::Csv)),
        )
}

fn permissions() -> StructuralMigration {
    StructuralMigration::new(2, "create_permissions").create_table(
        TableDefinition::system("permissions")
            .with_column(
                ColumnDefinition::new("role", DataType::Uuid)
                    .not_null()
                    .references("roles", "id"),
            )
            .with_column(string("collection").max_length(64).not_null())
            .with_column(string("action").max_length(16).not_null())
            .with_column(ColumnDefinition::new("permissions", DataType::Json))
            .with_column(ColumnDefinition::new("validation", DataType::Json))
            .with_column(ColumnDefinition::new("presets", DataType::Json))
            .with_column(ColumnDefinition::new("fields", DataType::Csv)),
    )
}

fn settings() -> StructuralMigration {
    StructuralMigration::new(3, "create_settings").create_table(
        TableDefinition::system("settings")
            .with_column(string("project_name").default_value(json!("Rectus")))
            .with_column(string("project_descriptor"))
            .with_column(flag("public_registration", false))
            .with_column(flag("maintenance_mode", false))
            .with_column(string("smtp_host"))
            .with_column(string("smtp_port").default_value(json!("587")))
            .with_column(string("smtp_user"))
            .with_column(string("smtp_from_email"))
            .with_column(flag("email_enabled", false))
            .with_column(
                ColumnDefinition::new("session_timeout", DataType::Integer)
                    .not_null()
                    .default_value(json!(24)),
            )
            .with_column(
                ColumnDefinition::new("password_min_length", DataType::Integer)
                    .not_null()
                    .default_value(json!(8)),
            )
            .with_column(flag("require_two_factor", false)),
    )
}

fn activity_and_revisions() -> StructuralMigration {
    StructuralMigration::new(4, "create_activity_and_revisions")
        .create_table(
            TableDefinition::system("activity")
                .with_column(string("action").max_length(45).not_null())
                .with_column(ColumnDefinition::new("user", DataType::Uuid).references("users", "id"))
                .with_column(ColumnDefinition::new("timestamp", DataType::DateTime).not_null())
                .with_column(string("ip").max_length(50))
                .with_column(string("user_agent"))
                .with_column(string("collection").max_length(64).not_null())
                .with_column(string("item").not_null())
                .with_column(ColumnDefinition::new("comment", DataType::Text)),
        )
        .create_table(
            TableDefinition::system("revisions")
                .with_column(
                    ColumnDefinition::new("activity", DataType::Uuid)
                        .not_null()
                        .references("activity", "id"),
                )
                .with_column(string("collection").max_length(64).not_null())
                .with_column(string("item").not_null())
                .with_column(ColumnDefinition::new("data", DataType::Json))
                .with_column(ColumnDefinition::new("delta", DataType::Json)),
        )
}

fn sessions() -> StructuralMigration {
    StructuralMigration::new(5, "create_sessions").create_table(
        TableDefinition::system("sessions")
            .with_column(required_string("token").max_length(64).unique())
            .with_column(
                ColumnDefinition::new("user", DataType::Uuid)
                    .not_null()
                    .references("users", "id"),
            )
            .with_column(ColumnDefinition::new("expires", DataType::DateTime).not_null())
            .with_column(string("ip").max_length(50))
            .with_column(string("user_agent")),
    )
}

/// Units 1..=5 in order.
pub fn base_migrations() -> Vec<Box<dyn MigrationUnit>> {
    vec![
        Box::new(roles_and_users()),
        Box::new(permissions()),
        Box::new(settings()),
        Box::new(activity_and_revisions()),
        Box::new(sessions()),
    ]
}
