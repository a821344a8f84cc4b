//! Repository for `servo_commands` and `action_commands`.

use smartcam_core::commands::{DeviceAction, ServoCommand};
use sqlx::SqlitePool;

use crate::models::command::{ActionCommandRow, ServoCommandRow};

const SERVO_COLUMNS: &str = "id, servo1, servo2, processed, created_at";
const ACTION_COLUMNS: &str = "id, action, intensity, processed, created_at";

pub struct CommandRepo;

impl CommandRepo {
    pub async fn insert_servo(
        pool: &SqlitePool,
        command: ServoCommand,
    ) -> Result<ServoCommandRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO servo_commands (servo1, servo2)
             VALUES (?1, ?2)
             RETURNING {SERVO_COLUMNS}"
        );
        sqlx::query_as::<_, ServoCommandRow>(&query)
            .bind(command.servo1)
            .bind(command.servo2)
            .fetch_one(pool)
            .await
    }

    pub async fn insert_action(
        pool: &SqlitePool,
        action: DeviceAction,
        intensity: u8,
    ) -> Result<ActionCommandRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO action_commands (action, intensity)
             VALUES (?1, ?2)
             RETURNING {ACTION_COLUMNS}"
        );
        sqlx::query_as::<_, ActionCommandRow>(&query)
            .bind(action.as_str())
            .bind(i32::from(intensity))
            .fetch_one(pool)
            .await
    }

    /// Most recently stored servo position.
    pub async fn latest_servo(pool: &SqlitePool) -> Result<Option<ServoCommandRow>, sqlx::Error> {
        let query = format!("SELECT {SERVO_COLUMNS} FROM servo_commands ORDER BY id DESC LIMIT 1");
        sqlx::query_as::<_, ServoCommandRow>(&query)
            .fetch_optional(pool)
            .await
    }
}
