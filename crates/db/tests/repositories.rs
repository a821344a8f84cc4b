use chrono::{Duration, Utc};
use smartcam_core::commands::{DeviceAction, ServoCommand};
use smartcam_db::models::log::LogFilter;
use smartcam_db::models::photo::CreatePhoto;
use smartcam_db::models::settings::UpdateSettings;
use smartcam_db::models::user::CreateUser;
use smartcam_db::models::video::{CreateVideo, DEFAULT_VIDEO_DURATION_SECS};
use smartcam_db::repositories::{CommandRepo, LogRepo, PhotoRepo, SettingsRepo, UserRepo, VideoRepo};
use sqlx::SqlitePool;

async fn create_user(pool: &SqlitePool, username: &str) -> smartcam_db::models::user::User {
    UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            password_hash: "$argon2id$dummy".to_string(),
            role: "user".to_string(),
        },
    )
    .await
    .unwrap()
}

fn photo(filename: &str) -> CreatePhoto {
    CreatePhoto {
        filename: filename.to_string(),
        filepath: format!("gallery/{filename}"),
        quality: 80,
        flash_used: false,
        flash_intensity: 50,
    }
}

// ---------------------------------------------------------------------------
// Test: schema bootstrap
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_migrations_create_all_tables(pool: SqlitePool) {
    smartcam_db::health_check(&pool).await.unwrap();

    for table in [
        "users",
        "user_settings",
        "logs",
        "servo_commands",
        "action_commands",
        "photos",
        "security_videos",
    ] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}

// ---------------------------------------------------------------------------
// Test: users
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_user_create_and_lookup(pool: SqlitePool) {
    let user = create_user(&pool, "alice").await;
    assert!(user.is_active);
    assert_eq!(user.failed_attempts, 0);
    assert_eq!(UserRepo::count(&pool).await.unwrap(), 1);

    let found = UserRepo::find_by_username(&pool, "alice").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(UserRepo::find_by_username(&pool, "Alice").await.unwrap().is_none());
    assert!(UserRepo::find_by_id(&pool, user.id).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_username_is_rejected(pool: SqlitePool) {
    create_user(&pool, "alice").await;
    let err = UserRepo::create(
        &pool,
        &CreateUser {
            username: "alice".to_string(),
            password_hash: "x".to_string(),
            role: "user".to_string(),
        },
    )
    .await
    .unwrap_err();

    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_failed_logins_lock_account(pool: SqlitePool) {
    let user = create_user(&pool, "bob").await;
    let lock_until = Utc::now() + Duration::minutes(15);

    for expected in 1..=4 {
        let count = UserRepo::record_failed_login(&pool, user.id, 5, lock_until)
            .await
            .unwrap();
        assert_eq!(count, expected);
    }
    let user = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert!(!user.is_locked(Utc::now()));

    UserRepo::record_failed_login(&pool, user.id, 5, lock_until)
        .await
        .unwrap();
    let user = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert!(user.is_locked(Utc::now()));

    UserRepo::record_successful_login(&pool, user.id, Utc::now())
        .await
        .unwrap();
    let user = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(user.failed_attempts, 0);
    assert!(user.locked_until.is_none());
    assert!(user.last_login_at.is_some());
}

// ---------------------------------------------------------------------------
// Test: settings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settings_upsert_patches_fields(pool: SqlitePool) {
    let user = create_user(&pool, "carol").await;
    assert!(SettingsRepo::get(&pool, user.id).await.unwrap().is_none());

    let created = SettingsRepo::upsert(
        &pool,
        user.id,
        &UpdateSettings {
            theme: Some("dark".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(created.theme, "dark");
    assert_eq!(created.servo1, 90);
    assert!(created.stream_enabled);

    let updated = SettingsRepo::upsert(
        &pool,
        user.id,
        &UpdateSettings {
            servo1: Some(45),
            smart_motion: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.theme, "dark");
    assert_eq!(updated.servo1, 45);
    assert!(updated.smart_motion);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settings_range_is_enforced(pool: SqlitePool) {
    let user = create_user(&pool, "dave").await;
    let result = SettingsRepo::upsert(
        &pool,
        user.id,
        &UpdateSettings {
            servo2: Some(181),
            ..Default::default()
        },
    )
    .await;
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Test: logs and commands
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_log_filtering(pool: SqlitePool) {
    LogRepo::insert(&pool, "boot", "info", Some("pico")).await.unwrap();
    LogRepo::insert(&pool, "sensor fault", "error", Some("pico")).await.unwrap();
    LogRepo::insert(&pool, "frame dropped", "warning", Some("esp32cam")).await.unwrap();
    LogRepo::insert(&pool, "servo moved", "command", None).await.unwrap();

    let all = LogRepo::list(&pool, &LogFilter { limit: 50, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].message, "servo moved");

    let pico = LogRepo::list(
        &pool,
        &LogFilter {
            source: Some("pico".to_string()),
            level: None,
            limit: 50,
        },
    )
    .await
    .unwrap();
    assert_eq!(pico.len(), 2);

    let pico_errors = LogRepo::list(
        &pool,
        &LogFilter {
            source: Some("pico".to_string()),
            level: Some("error".to_string()),
            limit: 50,
        },
    )
    .await
    .unwrap();
    assert_eq!(pico_errors.len(), 1);
    assert_eq!(pico_errors[0].message, "sensor fault");

    let limited = LogRepo::list(&pool, &LogFilter { limit: 1, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_commands_are_persisted(pool: SqlitePool) {
    assert!(CommandRepo::latest_servo(&pool).await.unwrap().is_none());

    CommandRepo::insert_servo(&pool, ServoCommand { servo1: 10, servo2: 20 })
        .await
        .unwrap();
    CommandRepo::insert_servo(&pool, ServoCommand { servo1: 30, servo2: 40 })
        .await
        .unwrap();
    let latest = CommandRepo::latest_servo(&pool).await.unwrap().unwrap();
    assert_eq!((latest.servo1, latest.servo2), (30, 40));
    assert!(!latest.processed);

    let action = CommandRepo::insert_action(&pool, DeviceAction::FlashOn, 75)
        .await
        .unwrap();
    assert_eq!(action.action, "flash_on");
    assert_eq!(action.intensity, 75);
}

// ---------------------------------------------------------------------------
// Test: photos
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_photo_paging_and_delete(pool: SqlitePool) {
    for i in 0..5 {
        PhotoRepo::insert(&pool, &photo(&format!("photo_{i}.jpg")))
            .await
            .unwrap();
    }
    assert_eq!(PhotoRepo::count(&pool).await.unwrap(), 5);

    let first = PhotoRepo::list(&pool, 2, 0).await.unwrap();
    let second = PhotoRepo::list(&pool, 2, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(first[0].filename, "photo_4.jpg");
    assert_ne!(first[1].id, second[0].id);

    assert!(PhotoRepo::find_by_filename(&pool, "photo_2.jpg").await.unwrap().is_some());
    assert!(PhotoRepo::delete_by_filename(&pool, "photo_2.jpg").await.unwrap());
    assert!(!PhotoRepo::delete_by_filename(&pool, "photo_2.jpg").await.unwrap());
    assert_eq!(PhotoRepo::count(&pool).await.unwrap(), 4);
}

// ---------------------------------------------------------------------------
// Test: security videos
// ---------------------------------------------------------------------------

fn video(filename: &str, hour: i32, minutes_ago: i64) -> CreateVideo {
    CreateVideo {
        filename: filename.to_string(),
        filepath: format!("security_videos/{filename}"),
        hour_of_day: hour,
        duration: DEFAULT_VIDEO_DURATION_SECS,
        size_bytes: 1024,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_video_index_pages_newest_first(pool: SqlitePool) {
    VideoRepo::insert(&pool, &video("video_2025-05-25_21-00-00.mp4", 21, 30))
        .await
        .unwrap()
        .unwrap();
    VideoRepo::insert(&pool, &video("video_2025-05-25_22-00-00.mp4", 22, 20))
        .await
        .unwrap()
        .unwrap();
    let newest = VideoRepo::insert(&pool, &video("video_2025-05-25_23-00-00.mp4", 23, 10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newest.hour_of_day, 23);
    assert_eq!(newest.duration, 3600);

    let page = VideoRepo::list(&pool, 2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].filename, "video_2025-05-25_23-00-00.mp4");
    assert_eq!(VideoRepo::list(&pool, 2, 2).await.unwrap().len(), 1);
    assert_eq!(VideoRepo::count(&pool).await.unwrap(), 3);

    let mut names = VideoRepo::filenames(&pool).await.unwrap();
    names.sort();
    assert_eq!(names[0], "video_2025-05-25_21-00-00.mp4");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_video_insert_is_idempotent_per_filename(pool: SqlitePool) {
    let clip = video("clip.mp4", 4, 1);
    assert!(VideoRepo::insert(&pool, &clip).await.unwrap().is_some());
    assert!(VideoRepo::insert(&pool, &clip).await.unwrap().is_none());
    assert_eq!(VideoRepo::count(&pool).await.unwrap(), 1);

    assert!(VideoRepo::find_by_filename(&pool, "clip.mp4").await.unwrap().is_some());
    assert!(VideoRepo::delete_by_filename(&pool, "clip.mp4").await.unwrap());
    assert!(!VideoRepo::delete_by_filename(&pool, "clip.mp4").await.unwrap());
    assert!(VideoRepo::find_by_filename(&pool, "clip.mp4").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_video_hour_is_range_checked(pool: SqlitePool) {
    let err = VideoRepo::insert(&pool, &video("bad.mp4", 24, 1)).await.unwrap_err();
    assert!(matches!(err, sqlx::Error::Database(ref db) if db.is_check_violation()));
}
