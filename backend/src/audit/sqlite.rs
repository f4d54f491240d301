use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::models::prompt::SystemPrompt;
use crate::relay::{BatchRecord, BatchSink, SinkError};

/// Summary of one logged batch call.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCallSummary {
    pub id: String,
    pub timestamp: String,
    pub model: String,
    pub input_prompt: String,
    pub outputs: Vec<String>,
}

/// SQLite-backed log of LLM calls and system prompts.
pub struct CallLogger {
    conn: Mutex<Connection>,
}

#[derive(Debug, thiserror::Error)]
pub enum CallLogError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl CallLogger {
    pub fn new(database_path: &str) -> Result<Self, CallLogError> {
        // Create parent directories if needed
        if database_path != ":memory:" {
            if let Some(parent) = Path::new(database_path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| CallLogError::Io(e.to_string()))?;
            }
        }

        let conn = Connection::open(database_path)
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        // Create calls table (non-streaming completions)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS calls (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                model TEXT NOT NULL,
                input_prompt TEXT,
                output TEXT
            )",
            [],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        // Create batch_calls table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS batch_calls (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                model TEXT NOT NULL,
                input_prompt TEXT,
                outputs TEXT NOT NULL,
                parameters TEXT
            )",
            [],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        // Create system_prompts table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS system_prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                prompt_text TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        // Create indexes
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_calls_timestamp ON calls(timestamp)",
            [],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_batch_calls_timestamp ON batch_calls(timestamp)",
            [],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        tracing::info!("Call logger initialized with database: {}", database_path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Log one completed `/completions` call. Returns the row id.
    pub fn log_call(
        &self,
        model: &str,
        input_prompt: &str,
        output_json: &str,
    ) -> Result<String, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO calls (id, timestamp, model, input_prompt, output)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                Utc::now().to_rfc3339(),
                model,
                input_prompt,
                output_json,
            ],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        tracing::debug!("Logged completion call: {}", id);
        Ok(id)
    }

    /// Log one settled batch call, keyed by its request id.
    pub fn log_batch_call(&self, record: &BatchRecord) -> Result<(), CallLogError> {
        let outputs = serde_json::to_string(&record.outputs)
            .map_err(|e| CallLogError::Database(e.to_string()))?;
        let parameters = serde_json::to_string(&record.params)
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO batch_calls (id, timestamp, model, input_prompt, outputs, parameters)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.request_id,
                Utc::now().to_rfc3339(),
                record.model,
                record.input_prompt,
                outputs,
                parameters,
            ],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        tracing::debug!("Logged batch call: {}", record.request_id);
        Ok(())
    }

    /// Final outputs of a logged batch call, if present.
    pub fn batch_outputs(&self, request_id: &str) -> Result<Option<Vec<String>>, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let outputs: Option<String> = conn
            .query_row(
                "SELECT outputs FROM batch_calls WHERE id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        match outputs {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CallLogError::Database(e.to_string())),
            None => Ok(None),
        }
    }

    /// Most recent batch calls, newest first.
    pub fn recent_batch_calls(&self, limit: usize) -> Result<Vec<BatchCallSummary>, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, model, input_prompt, outputs FROM batch_calls
                 ORDER BY rowid DESC LIMIT ?1",
            )
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| CallLogError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|(id, timestamp, model, input_prompt, outputs)| {
                let outputs = serde_json::from_str(&outputs)
                    .map_err(|e| CallLogError::Database(e.to_string()))?;
                Ok(BatchCallSummary {
                    id,
                    timestamp,
                    model,
                    input_prompt,
                    outputs,
                })
            })
            .collect()
    }

    /// Number of logged completion calls.
    pub fn call_count(&self) -> Result<u64, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        conn.query_row("SELECT COUNT(*) FROM calls", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(|e| CallLogError::Database(e.to_string()))
    }

    /// All system prompts, most used first.
    pub fn list_system_prompts(&self) -> Result<Vec<SystemPrompt>, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, prompt_text FROM system_prompts ORDER BY usage_count DESC",
            )
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let prompts = stmt
            .query_map([], |row| {
                Ok(SystemPrompt {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    prompt_text: row.get(2)?,
                })
            })
            .map_err(|e| CallLogError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        Ok(prompts)
    }

    /// Store a new system prompt. Returns its id.
    pub fn create_system_prompt(
        &self,
        name: &str,
        prompt_text: &str,
    ) -> Result<i64, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO system_prompts (name, prompt_text) VALUES (?1, ?2)",
            params![name, prompt_text],
        )
        .map_err(|e| CallLogError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    /// Bump a prompt's usage counter. Returns false when the id is unknown.
    pub fn increment_prompt_usage(&self, prompt_id: i64) -> Result<bool, CallLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        let updated = conn
            .execute(
                "UPDATE system_prompts SET usage_count = usage_count + 1 WHERE id = ?1",
                params![prompt_id],
            )
            .map_err(|e| CallLogError::Database(e.to_string()))?;

        Ok(updated > 0)
    }
}

impl BatchSink for CallLogger {
    fn record_batch(&self, record: &BatchRecord) -> Result<(), SinkError> {
        self.log_batch_call(record)
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}
