use sqlx::Row;

use waqf_core::domain::beneficiary::{Beneficiary, BeneficiaryId};

use super::{parse_timestamp, BeneficiaryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBeneficiaryRepository {
    pool: DbPool,
}

impl SqlBeneficiaryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_beneficiary(row: &sqlx::sqlite::SqliteRow) -> Result<Beneficiary, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let full_name: String =
        row.try_get("full_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let national_id: String =
        row.try_get("national_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: Option<String> =
        row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Beneficiary {
        id: BeneficiaryId(id),
        full_name,
        national_id,
        category,
        phone,
        active,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl BeneficiaryRepository for SqlBeneficiaryRepository {
    async fn find_by_id(&self, id: &BeneficiaryId) -> Result<Option<Beneficiary>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, full_name, national_id, category, phone, active, created_at
             FROM beneficiaries WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_beneficiary).transpose()
    }

    async fn save(&self, beneficiary: Beneficiary) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO beneficiaries (id, full_name, national_id, category, phone, active,
                                        created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 full_name = excluded.full_name,
                 national_id = excluded.national_id,
                 category = excluded.category,
                 phone = excluded.phone,
                 active = excluded.active",
        )
        .bind(&beneficiary.id.0)
        .bind(&beneficiary.full_name)
        .bind(&beneficiary.national_id)
        .bind(&beneficiary.category)
        .bind(&beneficiary.phone)
        .bind(beneficiary.active)
        .bind(beneficiary.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Beneficiary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, full_name, national_id, category, phone, active, created_at
             FROM beneficiaries WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_beneficiary).collect()
    }
}
