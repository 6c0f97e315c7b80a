// Integration tests for the session log writer
//
// These tests verify the framing contract (start / audio... / end), the
// create-new guard and finalization on every exit path.

mod common;

use anyhow::Result;
use base64::Engine;
use chrono::Utc;
use std::path::Path;
use tempfile::TempDir;

use common::read_log;
use voice_recorder::session::{AudioRecord, SessionLogWriter, SessionMeta, SessionRecord};

fn meta(dir: &Path) -> SessionMeta {
    SessionMeta::new(
        1,
        "Game Night".to_string(),
        42,
        "General".to_string(),
        "alice".to_string(),
        dir,
    )
}

fn audio(user_id: Option<u64>, payload: &[u8]) -> AudioRecord {
    AudioRecord {
        source_user_id: user_id,
        source_user_name: user_id.map(|id| format!("user-{}", id)),
        received_at: Utc::now(),
        payload: payload.to_vec(),
    }
}

#[tokio::test]
async fn test_writer_frames_header_entries_footer() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let meta = meta(temp_dir.path());

    let mut writer = SessionLogWriter::open(&meta.log_path).await?;
    writer.write_header(&meta).await?;
    writer.write_entry(&audio(Some(7), &[1, 2, 3])).await?;
    writer.write_entry(&audio(None, &[4, 5])).await?;
    writer.close().await?;

    assert_eq!(writer.entries_written(), 2);

    let records = read_log(&meta.log_path);
    assert_eq!(records.len(), 4);

    match &records[0] {
        SessionRecord::SessionStart {
            guild_id,
            guild_name,
            channel_id,
            channel_name,
            ..
        } => {
            assert_eq!(*guild_id, 1);
            assert_eq!(guild_name, "Game Night");
            assert_eq!(*channel_id, 42);
            assert_eq!(channel_name, "General");
        }
        other => panic!("expected session-start, got {:?}", other),
    }

    match &records[1] {
        SessionRecord::Audio {
            user_id,
            user_name,
            audio,
            ..
        } => {
            assert_eq!(*user_id, Some(7));
            assert_eq!(user_name.as_deref(), Some("user-7"));
            let decoded = base64::engine::general_purpose::STANDARD.decode(audio)?;
            assert_eq!(decoded, vec![1, 2, 3]);
        }
        other => panic!("expected audio, got {:?}", other),
    }

    match &records[2] {
        SessionRecord::Audio { user_id, user_name, .. } => {
            assert_eq!(*user_id, None);
            assert_eq!(*user_name, None);
        }
        other => panic!("expected audio, got {:?}", other),
    }

    assert!(matches!(records[3], SessionRecord::SessionEnd { .. }));

    Ok(())
}

#[tokio::test]
async fn test_open_refuses_existing_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("session.jsonl");
    std::fs::write(&path, "existing content\n")?;

    let err = match SessionLogWriter::open(&path).await {
        Ok(_) => panic!("open should fail on an existing file"),
        Err(e) => e,
    };
    assert!(err.is_path_collision(), "unexpected error: {}", err);

    // Existing content untouched
    assert_eq!(std::fs::read_to_string(&path)?, "existing content\n");

    Ok(())
}

#[tokio::test]
async fn test_close_without_header_still_writes_end() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("headerless.jsonl");

    let mut writer = SessionLogWriter::open(&path).await?;
    writer.close().await?;

    let records = read_log(&path);
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0], SessionRecord::SessionEnd { .. }));

    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let meta = meta(temp_dir.path());

    let mut writer = SessionLogWriter::open(&meta.log_path).await?;
    writer.write_header(&meta).await?;
    writer.close().await?;
    writer.close().await?;

    assert!(writer.is_closed());
    let records = read_log(&meta.log_path);
    let ends = records
        .iter()
        .filter(|r| matches!(r, SessionRecord::SessionEnd { .. }))
        .count();
    assert_eq!(ends, 1, "session-end must be written exactly once");

    Ok(())
}

#[tokio::test]
async fn test_entry_before_header_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("early.jsonl");

    let mut writer = SessionLogWriter::open(&path).await?;
    assert!(writer.write_entry(&audio(Some(7), &[1])).await.is_err());
    writer.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_entry_after_close_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let meta = meta(temp_dir.path());

    let mut writer = SessionLogWriter::open(&meta.log_path).await?;
    writer.write_header(&meta).await?;
    writer.close().await?;

    assert!(writer.write_entry(&audio(Some(7), &[1])).await.is_err());
    assert_eq!(read_log(&meta.log_path).len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_drop_without_close_finalizes_log() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let meta = meta(temp_dir.path());

    {
        let mut writer = SessionLogWriter::open(&meta.log_path).await?;
        writer.write_header(&meta).await?;
        writer.write_entry(&audio(Some(9), &[9, 9])).await?;
        // Early exit path: writer dropped without close()
    }

    let records = read_log(&meta.log_path);
    assert_eq!(records.len(), 3);
    assert!(matches!(records[2], SessionRecord::SessionEnd { .. }));

    Ok(())
}

#[tokio::test]
async fn test_every_entry_is_on_disk_before_close() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let meta = meta(temp_dir.path());

    let mut writer = SessionLogWriter::open(&meta.log_path).await?;
    writer.write_header(&meta).await?;

    for i in 0..5u8 {
        writer.write_entry(&audio(Some(7), &[i])).await?;
        // Reading from a separate handle sees each flushed line
        assert_eq!(read_log(&meta.log_path).len(), 2 + i as usize);
    }

    writer.close().await?;
    Ok(())
}
