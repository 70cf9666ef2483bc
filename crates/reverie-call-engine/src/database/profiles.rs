//! Profile and prompt template operations

use chrono_tz::Tz;
use reverie_core::{PhoneNumber, Profile, Prompt, PromptId, PromptTemplate, UserId};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Profile> {
    let phone: String = row.try_get("phone_number")?;
    let timezone: String = row.try_get("timezone")?;
    let tz: Tz = timezone
        .parse()
        .map_err(|_| EngineError::database(format!("stored timezone invalid: {timezone}")))?;

    Ok(Profile {
        user_id: UserId(row.try_get("user_id")?),
        phone_number: PhoneNumber::parse(&phone)?,
        display_name: row.try_get("display_name")?,
        name_pronunciation: row.try_get("name_pronunciation")?,
        timezone: tz,
        include_rating_prompt: row.try_get::<i64, _>("include_rating_prompt")? != 0,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
    })
}

impl DatabaseManager {
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;

        sqlx::query(
            "INSERT INTO profiles (user_id, phone_number, display_name, name_pronunciation,
                                   timezone, include_rating_prompt, max_retries)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                phone_number = excluded.phone_number,
                display_name = excluded.display_name,
                name_pronunciation = excluded.name_pronunciation,
                timezone = excluded.timezone,
                include_rating_prompt = excluded.include_rating_prompt,
                max_retries = excluded.max_retries",
        )
        .bind(profile.user_id.as_str())
        .bind(profile.phone_number.as_str())
        .bind(&profile.display_name)
        .bind(&profile.name_pronunciation)
        .bind(profile.timezone.name())
        .bind(profile.include_rating_prompt as i64)
        .bind(profile.max_retries as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT user_id, phone_number, display_name, name_pronunciation, timezone,
                    include_rating_prompt, max_retries
             FROM profiles WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(profile_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_prompt_template(&self, template: &PromptTemplate) -> Result<()> {
        sqlx::query(
            "INSERT INTO prompt_templates (prompt_id, user_id, prompt_text, position, active,
                                           is_rating_prompt)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(prompt_id) DO UPDATE SET
                prompt_text = excluded.prompt_text,
                position = excluded.position,
                active = excluded.active,
                is_rating_prompt = excluded.is_rating_prompt",
        )
        .bind(template.prompt_id.as_str())
        .bind(template.user_id.as_str())
        .bind(&template.prompt_text)
        .bind(template.position as i64)
        .bind(template.active as i64)
        .bind(template.is_rating_prompt as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The user's active prompts in position order, as snapshot elements.
    pub async fn active_prompts(&self, user_id: &UserId) -> Result<Vec<Prompt>> {
        let rows = sqlx::query(
            "SELECT prompt_id, prompt_text, is_rating_prompt
             FROM prompt_templates
             WHERE user_id = ? AND active = 1
             ORDER BY position ASC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut prompts = Vec::with_capacity(rows.len());
        for row in rows {
            prompts.push(Prompt {
                prompt_id: PromptId(row.try_get("prompt_id")?),
                prompt_text: row.try_get("prompt_text")?,
                is_rating: row.try_get::<i64, _>("is_rating_prompt")? != 0,
            });
        }
        Ok(prompts)
    }
}
