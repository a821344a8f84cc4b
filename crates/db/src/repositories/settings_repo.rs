//! Repository for the `user_settings` table.

use smartcam_core::types::DbId;
use sqlx::SqlitePool;

use crate::models::settings::{UpdateSettings, UserSettings};

const COLUMNS: &str = "user_id, theme, language, servo1, servo2, photo_quality, \
                       smart_motion, smart_tracking, stream_enabled, updated_at";

pub struct SettingsRepo;

impl SettingsRepo {
    pub async fn get(pool: &SqlitePool, user_id: DbId) -> Result<Option<UserSettings>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_settings WHERE user_id = ?1");
        sqlx::query_as::<_, UserSettings>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or patch the settings row for `user_id`.
    ///
    /// Fields left as `None` keep their stored value, or the column default
    /// when the row is new.
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: DbId,
        input: &UpdateSettings,
    ) -> Result<UserSettings, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_settings
                (user_id, theme, language, servo1, servo2, photo_quality,
                 smart_motion, smart_tracking, stream_enabled)
             VALUES (
                ?1,
                COALESCE(?2, 'light'),
                COALESCE(?3, 'fa'),
                COALESCE(?4, 90),
                COALESCE(?5, 90),
                COALESCE(?6, 80),
                COALESCE(?7, 0),
                COALESCE(?8, 0),
                COALESCE(?9, 1)
             )
             ON CONFLICT(user_id) DO UPDATE SET
                theme = COALESCE(?2, user_settings.theme),
                language = COALESCE(?3, user_settings.language),
                servo1 = COALESCE(?4, user_settings.servo1),
                servo2 = COALESCE(?5, user_settings.servo2),
                photo_quality = COALESCE(?6, user_settings.photo_quality),
                smart_motion = COALESCE(?7, user_settings.smart_motion),
                smart_tracking = COALESCE(?8, user_settings.smart_tracking),
                stream_enabled = COALESCE(?9, user_settings.stream_enabled),
                updated_at = CURRENT_TIMESTAMP
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSettings>(&query)
            .bind(user_id)
            .bind(&input.theme)
            .bind(&input.language)
            .bind(input.servo1)
            .bind(input.servo2)
            .bind(input.photo_quality)
            .bind(input.smart_motion)
            .bind(input.smart_tracking)
            .bind(input.stream_enabled)
            .fetch_one(pool)
            .await
    }
}
