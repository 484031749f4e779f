// Publication projection: the read-only view pushed to the shared sheet

use std::path::Path;

use iprtrack_core::model::display_folder_date;
use iprtrack_recon::Registry;
use serde::Serialize;

use crate::error::StoreError;

pub const PROJECTION_HEADERS: [&str; 6] = ["№", "NAME_FOR_FOLDER", "INN", "STATUS", "LAST_DATE", "URL"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionRow {
    pub sequence_number: u32,
    pub folder_name: String,
    pub tax_id: String,
    pub status: String,
    pub latest_date: String,
    pub remote_url: String,
    /// Rendered with a highlight by the publication target.
    #[serde(skip)]
    pub inactive: bool,
}

impl ProjectionRow {
    pub fn cells(&self) -> [String; 6] {
        [
            self.sequence_number.to_string(),
            self.folder_name.clone(),
            self.tax_id.clone(),
            self.status.clone(),
            self.latest_date.clone(),
            self.remote_url.clone(),
        ]
    }
}

/// Rows in registry order.
pub fn project(registry: &Registry) -> Vec<ProjectionRow> {
    registry
        .iter()
        .map(|r| ProjectionRow {
            sequence_number: r.sequence_number,
            folder_name: r.folder_name().to_string(),
            tax_id: r.tax_id.to_string(),
            status: r.status.label().to_string(),
            latest_date: display_folder_date(&r.folder_latest_date),
            remote_url: r.remote_url.clone(),
            inactive: r.is_inactive_highlighted(),
        })
        .collect()
}

/// Write the projection with its header to a CSV file.
pub fn export_csv(rows: &[ProjectionRow], path: &Path) -> Result<(), StoreError> {
    let csv_err = |e: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(csv_err)?;
    writer.write_record(PROJECTION_HEADERS).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row.cells()).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use iprtrack_core::{CompanyRecord, CompanyStatus, FolderDate, TaxId};
    use std::fs;
    use tempfile::tempdir;

    fn registry() -> Registry {
        let mut a = CompanyRecord::new(1, TaxId::parse("123").unwrap(), "ООО Ромашка");
        a.extracted_name = "РОМАШКА".into();
        a.status = CompanyStatus::Bankrupt;
        a.folder_latest_date = Some(FolderDate::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()));
        a.remote_url = "https://disk.example/1".into();
        let b = CompanyRecord::new(2, TaxId::parse("456").unwrap(), "АО Вектор");
        Registry::from_records(vec![a, b]).unwrap()
    }

    #[test]
    fn projects_in_order_with_derived_fields() {
        let rows = project(&registry());
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].cells(),
            ["1", "РОМАШКА", "123", "Банкротство", "10.01.2024", "https://disk.example/1"]
                .map(String::from)
        );
        assert!(rows[0].inactive);
        // No extracted name yet: folder name falls back to the observed one.
        assert_eq!(rows[1].folder_name, "АО Вектор");
        assert_eq!(rows[1].latest_date, "");
        assert!(!rows[1].inactive);
    }

    #[test]
    fn csv_export_has_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("projection.csv");
        export_csv(&project(&registry()), &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("№,NAME_FOR_FOLDER,INN,STATUS,LAST_DATE,URL"));
        assert_eq!(lines.next(), Some("1,РОМАШКА,123,Банкротство,10.01.2024,https://disk.example/1"));
        assert_eq!(lines.next(), Some("2,АО Вектор,456,Действующая,,"));
    }
}
