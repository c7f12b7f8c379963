use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::{path::Path, thread, time::Duration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::models::{ApiKeys, CanonicalDocument, Provider, UserSettings};

/**
 * \brief 打开数据库文件并设置忙等待超时。
 */
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 运行数据库迁移，创建必要表结构（可重复执行）。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS seo_content (
            id TEXT PRIMARY KEY,
            keyword TEXT NOT NULL,
            title TEXT NOT NULL,
            meta_description TEXT NOT NULL,
            content TEXT NOT NULL,
            h1_tag TEXT NOT NULL,
            h2_tags TEXT NOT NULL DEFAULT '[]',
            h3_tags TEXT NOT NULL DEFAULT '[]',
            faq_section TEXT,
            schema_markup TEXT,
            word_count INTEGER NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_unix_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_seo_content_created
            ON seo_content (created_unix_ms DESC);

        CREATE TABLE IF NOT EXISTS user_settings (
            id TEXT NOT NULL,
            user_id TEXT PRIMARY KEY,
            openai_key TEXT,
            anthropic_key TEXT,
            gemini_key TEXT,
            groq_key TEXT,
            grok_key TEXT,
            preferred_provider TEXT,
            preferred_model TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

const CONTENT_COLUMNS: &str = "id, keyword, title, meta_description, content, h1_tag, h2_tags, h3_tags, faq_section, schema_markup, word_count, provider, model, created_at";

/**
 * \brief 数据库中的原始文档行。
 */
struct ContentRow {
    id: String,
    keyword: String,
    title: String,
    meta_description: String,
    content: String,
    h1_tag: String,
    h2_tags: String,
    h3_tags: String,
    faq_section: Option<String>,
    schema_markup: Option<String>,
    word_count: i64,
    provider: String,
    model: String,
    created_at: String,
}

impl ContentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            keyword: row.get(1)?,
            title: row.get(2)?,
            meta_description: row.get(3)?,
            content: row.get(4)?,
            h1_tag: row.get(5)?,
            h2_tags: row.get(6)?,
            h3_tags: row.get(7)?,
            faq_section: row.get(8)?,
            schema_markup: row.get(9)?,
            word_count: row.get(10)?,
            provider: row.get(11)?,
            model: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn into_document(self) -> Result<CanonicalDocument> {
        Ok(CanonicalDocument {
            provider: self.provider.parse::<Provider>().map_err(|e| anyhow!(e))?,
            h2_list: serde_json::from_str(&self.h2_tags)?,
            h3_list: serde_json::from_str(&self.h3_tags)?,
            word_count: u32::try_from(self.word_count)?,
            created_at: OffsetDateTime::parse(&self.created_at, &Rfc3339)?,
            id: self.id,
            keyword: self.keyword,
            title: self.title,
            meta_description: self.meta_description,
            body: self.content,
            h1: self.h1_tag,
            faq_section: self.faq_section,
            schema_markup: self.schema_markup,
            model: self.model,
        })
    }
}

fn unix_ms(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/**
 * \brief 写入一篇生成结果（仅插入，不覆盖）。
 */
pub fn insert_content(conn: &Connection, doc: &CanonicalDocument) -> Result<()> {
    let h2 = serde_json::to_string(&doc.h2_list)?;
    let h3 = serde_json::to_string(&doc.h3_list)?;
    let created_at = doc.created_at.format(&Rfc3339)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO seo_content (id, keyword, title, meta_description, content, h1_tag, h2_tags, h3_tags, faq_section, schema_markup, word_count, provider, model, created_at, created_unix_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                doc.id,
                doc.keyword,
                doc.title,
                doc.meta_description,
                doc.body,
                doc.h1,
                h2,
                h3,
                doc.faq_section,
                doc.schema_markup,
                doc.word_count,
                doc.provider.as_str(),
                doc.model,
                created_at,
                unix_ms(doc.created_at),
            ],
        )
    })?;
    Ok(())
}

/**
 * \brief 按 ID 读取文档（不存在返回 None）。
 */
pub fn get_content(conn: &Connection, id: &str) -> Result<Option<CanonicalDocument>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM seo_content WHERE id=?1", CONTENT_COLUMNS),
            params![id],
            ContentRow::from_row,
        )
        .optional()?;
    row.map(ContentRow::into_document).transpose()
}

/**
 * \brief 按创建时间倒序列出最近的文档。
 */
pub fn list_recent_content(conn: &Connection, limit: u32) -> Result<Vec<CanonicalDocument>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM seo_content ORDER BY created_unix_ms DESC, rowid DESC LIMIT ?1",
        CONTENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![limit], ContentRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(ContentRow::into_document).collect()
}

/**
 * \brief 按 user_id 整体替换保存用户设置。
 */
pub fn upsert_settings(conn: &Connection, settings: &UserSettings) -> Result<()> {
    let keys = &settings.api_keys;
    let created_at = settings.created_at.format(&Rfc3339)?;
    let updated_at = settings.updated_at.format(&Rfc3339)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO user_settings (id, user_id, openai_key, anthropic_key, gemini_key, groq_key, grok_key, preferred_provider, preferred_model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id) DO UPDATE SET
                id=excluded.id,
                openai_key=excluded.openai_key,
                anthropic_key=excluded.anthropic_key,
                gemini_key=excluded.gemini_key,
                groq_key=excluded.groq_key,
                grok_key=excluded.grok_key,
                preferred_provider=excluded.preferred_provider,
                preferred_model=excluded.preferred_model,
                created_at=excluded.created_at,
                updated_at=excluded.updated_at",
            params![
                settings.id,
                settings.user_id,
                keys.openai_key,
                keys.anthropic_key,
                keys.gemini_key,
                keys.groq_key,
                keys.grok_key,
                settings.preferred_provider.map(|p| p.as_str()),
                settings.preferred_model,
                created_at,
                updated_at,
            ],
        )
    })?;
    Ok(())
}

/**
 * \brief 读取用户设置（未保存过返回 None）。
 */
pub fn get_settings(conn: &Connection, user_id: &str) -> Result<Option<UserSettings>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, openai_key, anthropic_key, gemini_key, groq_key, grok_key, preferred_provider, preferred_model, created_at, updated_at
             FROM user_settings WHERE user_id=?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    ApiKeys {
                        openai_key: row.get(2)?,
                        anthropic_key: row.get(3)?,
                        gemini_key: row.get(4)?,
                        groq_key: row.get(5)?,
                        grok_key: row.get(6)?,
                    },
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                ))
            },
        )
        .optional()?;

    let Some((id, user_id, api_keys, provider, preferred_model, created_at, updated_at)) = row
    else {
        return Ok(None);
    };
    let preferred_provider = provider
        .map(|p| p.parse::<Provider>().map_err(|e| anyhow!(e)))
        .transpose()?;
    Ok(Some(UserSettings {
        id,
        user_id,
        api_keys,
        preferred_provider,
        preferred_model,
        created_at: OffsetDateTime::parse(&created_at, &Rfc3339)?,
        updated_at: OffsetDateTime::parse(&updated_at, &Rfc3339)?,
    }))
}

/**
 * \brief 读取用户为指定服务商保存的凭据。
 */
pub fn stored_api_key(conn: &Connection, user_id: &str, provider: Provider) -> Result<Option<String>> {
    let settings = get_settings(conn, user_id)?;
    Ok(settings.and_then(|s| s.api_keys.for_provider(provider).map(str::to_string)))
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并进行指数退避，最大尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    for attempt in 0..=MAX_RETRIES {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                let backoff = Duration::from_millis(200 * (attempt as u64 + 1));
                thread::sleep(backoff);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!("retry_on_locked should have returned within the loop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn mem_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        migrate(&conn).expect("migrate");
        conn
    }

    fn doc(id: &str, created_at: OffsetDateTime) -> CanonicalDocument {
        CanonicalDocument {
            id: id.to_string(),
            keyword: "cold brew".to_string(),
            title: "Cold Brew Guide".to_string(),
            meta_description: "Everything about cold brew.".to_string(),
            body: "<p>Steep overnight.</p>".to_string(),
            h1: "Cold Brew".to_string(),
            h2_list: vec!["Beans".to_string(), "Ratio".to_string()],
            h3_list: vec!["Grind".to_string()],
            faq_section: Some("Q&A".to_string()),
            schema_markup: None,
            word_count: 42,
            provider: Provider::Anthropic,
            model: "claude-3-5-haiku-20241022".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = mem_conn();
        migrate(&conn).expect("second migrate");
    }

    #[test]
    fn test_content_insert_and_get() {
        let conn = mem_conn();
        let stored = doc("a", datetime!(2025-03-01 10:00:00.125 UTC));
        insert_content(&conn, &stored).expect("insert");

        let loaded = get_content(&conn, "a").expect("get").expect("present");
        assert_eq!(loaded, stored);
        assert!(get_content(&conn, "missing").expect("get missing").is_none());
    }

    #[test]
    fn test_content_is_insert_only() {
        let conn = mem_conn();
        let first = doc("a", datetime!(2025-03-01 10:00:00 UTC));
        insert_content(&conn, &first).expect("insert");
        assert!(insert_content(&conn, &first).is_err());
    }

    #[test]
    fn test_list_recent_orders_newest_first_with_limit() {
        let conn = mem_conn();
        insert_content(&conn, &doc("old", datetime!(2025-01-01 00:00:00 UTC))).expect("old");
        insert_content(&conn, &doc("new", datetime!(2025-03-01 00:00:00 UTC))).expect("new");
        insert_content(&conn, &doc("mid", datetime!(2025-02-01 00:00:00.5 UTC))).expect("mid");

        let all = list_recent_content(&conn, 10).expect("list");
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let top = list_recent_content(&conn, 2).expect("list 2");
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, "new");
    }

    #[test]
    fn test_settings_upsert_replaces_record() {
        let conn = mem_conn();
        let mut settings = UserSettings::default_for("user-1");
        settings.api_keys.openai_key = Some("sk-1".to_string());
        settings.preferred_provider = Some(Provider::OpenAI);
        settings.preferred_model = Some("gpt-4o".to_string());
        settings.created_at = datetime!(2025-01-01 00:00:00 UTC);
        settings.updated_at = datetime!(2025-01-01 00:00:00 UTC);
        upsert_settings(&conn, &settings).expect("first upsert");

        let mut replacement = UserSettings::default_for("user-1");
        replacement.api_keys.groq_key = Some("gsk-2".to_string());
        replacement.created_at = datetime!(2025-02-01 00:00:00 UTC);
        replacement.updated_at = datetime!(2025-02-01 00:00:00 UTC);
        upsert_settings(&conn, &replacement).expect("second upsert");

        let loaded = get_settings(&conn, "user-1").expect("get").expect("present");
        assert_eq!(loaded, replacement);
        assert_eq!(loaded.api_keys.openai_key, None);
        assert_eq!(loaded.preferred_provider, None);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM user_settings WHERE user_id='user-1'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_stored_api_key_reads_saved_settings() {
        let conn = mem_conn();
        let mut settings = UserSettings::default_for("user-2");
        settings.api_keys.grok_key = Some("xai-9".to_string());
        upsert_settings(&conn, &settings).expect("upsert");

        assert_eq!(
            stored_api_key(&conn, "user-2", Provider::Grok).expect("grok"),
            Some("xai-9".to_string())
        );
        assert_eq!(stored_api_key(&conn, "user-2", Provider::OpenAI).expect("openai"), None);
        assert_eq!(stored_api_key(&conn, "nobody", Provider::Grok).expect("nobody"), None);
    }

    #[test]
    fn test_settings_missing_user_is_none() {
        let conn = mem_conn();
        assert!(get_settings(&conn, "nobody").expect("get").is_none());
    }
}
