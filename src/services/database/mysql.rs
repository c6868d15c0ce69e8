// MySQL-protocol backend used for both the Doris warehouse and the
// secondary relational catalog (Doris speaks the MySQL wire protocol).
use crate::error::{Error, Result};
use crate::services::database::backend::{
    BackendRow, CellValue, QueryBackend, QueryOutput, TabularResult,
};
use chrono::NaiveDate;
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, Opts, Pool, Row, Value as MySqlValue};
use url::Url;

pub struct MySqlBackend {
    pool: Pool,
}

impl MySqlBackend {
    pub fn new(connection_url: &str) -> Result<Self> {
        let url = Url::parse(connection_url)
            .map_err(|e| Error::Config(format!("Invalid backend URL: {}", e)))?;

        // Doris endpoints are commonly configured with a doris:// scheme;
        // the wire protocol is MySQL either way.
        let mysql_url = match url.scheme() {
            "doris" => connection_url.replacen("doris://", "mysql://", 1),
            "mysql" => connection_url.to_string(),
            other => {
                return Err(Error::Config(format!(
                    "URL must use mysql:// or doris:// scheme, got {}://",
                    other
                )))
            }
        };

        let opts = Opts::from_url(&mysql_url)
            .map_err(|e| Error::Config(format!("Invalid backend URL: {}", e)))?;

        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    async fn conn(&self, db: Option<&str>) -> Result<Conn> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| Error::Connection(format!("Failed to get connection from pool: {}", e)))?;

        // Target database is selected per statement, mirroring the logical
        // name resolution done by the router.
        if let Some(db) = db {
            if !db.is_empty() {
                conn.query_drop(format!("USE `{}`", db))
                    .await
                    .map_err(|e| Error::Backend(format!("Failed to select database {}: {}", db, e)))?;
            }
        }

        Ok(conn)
    }

    fn cell_from_value(column_type: ColumnType, value: MySqlValue) -> CellValue {
        match value {
            MySqlValue::NULL => CellValue::Null,
            MySqlValue::Bytes(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                match column_type {
                    // DECIMAL arrives as text over the wire; keep the exact
                    // rendering so normalization decides the float cast.
                    ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                        CellValue::Decimal(text)
                    }
                    _ => CellValue::Text(text),
                }
            }
            MySqlValue::Int(i) => CellValue::Int(i),
            MySqlValue::UInt(u) => CellValue::UInt(u),
            MySqlValue::Float(f) => CellValue::Float(f as f64),
            MySqlValue::Double(d) => CellValue::Float(d),
            MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
                let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32);
                match (column_type, date) {
                    (ColumnType::MYSQL_TYPE_DATE, Some(date)) => CellValue::Date(date),
                    (_, Some(date)) => date
                        .and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                        .map(CellValue::DateTime)
                        .unwrap_or(CellValue::Null),
                    (_, None) => CellValue::Null,
                }
            }
            MySqlValue::Time(negative, days, hours, minutes, seconds, _) => {
                let sign = if negative { "-" } else { "" };
                let total_hours = days * 24 + hours as u32;
                CellValue::Text(format!("{}{}:{:02}:{:02}", sign, total_hours, minutes, seconds))
            }
        }
    }

    fn cell_at(row: &Row, idx: usize) -> CellValue {
        let column_type = row.columns_ref()[idx].column_type();
        match row.get_opt::<MySqlValue, usize>(idx) {
            Some(Ok(value)) => Self::cell_from_value(column_type, value),
            _ => CellValue::Null,
        }
    }
}

#[async_trait::async_trait]
impl QueryBackend for MySqlBackend {
    async fn run_query(&self, sql: &str, db: Option<&str>) -> Result<QueryOutput> {
        let mut conn = self.conn(db).await?;

        let rows: Vec<Row> = conn
            .query(sql)
            .await
            .map_err(|e| Error::Backend(format!("Query execution failed: {}", e)))?;

        if rows.is_empty() {
            let affected = conn.affected_rows();
            if affected > 0 {
                return Ok(QueryOutput::Scalar(format!("{} rows affected", affected)));
            }
            return Ok(QueryOutput::Rows(Vec::new()));
        }

        let mapped = rows
            .iter()
            .map(|row| {
                let fields = row
                    .columns_ref()
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        (column.name_str().to_string(), Self::cell_at(row, idx))
                    })
                    .collect();
                BackendRow::Mapping(fields)
            })
            .collect();

        Ok(QueryOutput::Rows(mapped))
    }

    async fn run_query_tabular(&self, sql: &str, db: Option<&str>) -> Result<TabularResult> {
        let mut conn = self.conn(db).await?;

        let rows: Vec<Row> = conn
            .query(sql)
            .await
            .map_err(|e| Error::Backend(format!("Query execution failed: {}", e)))?;

        let Some(first) = rows.first() else {
            return Ok(TabularResult::default());
        };

        let columns = first
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();

        let data = rows
            .iter()
            .map(|row| (0..row.columns_ref().len()).map(|idx| Self::cell_at(row, idx)).collect())
            .collect();

        Ok(TabularResult {
            columns,
            rows: data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_mysql_scheme() {
        assert!(MySqlBackend::new("postgres://localhost/db").is_err());
        assert!(MySqlBackend::new("not a url").is_err());
    }

    #[test]
    fn test_accepts_doris_scheme() {
        assert!(MySqlBackend::new("doris://root@localhost:9030/demo").is_ok());
        assert!(MySqlBackend::new("mysql://root@localhost:3306/demo").is_ok());
    }

    #[test]
    fn test_decimal_bytes_keep_text_form() {
        let cell = MySqlBackend::cell_from_value(
            ColumnType::MYSQL_TYPE_NEWDECIMAL,
            MySqlValue::Bytes(b"12.50".to_vec()),
        );
        assert_eq!(cell, CellValue::Decimal("12.50".to_string()));

        let cell = MySqlBackend::cell_from_value(
            ColumnType::MYSQL_TYPE_VAR_STRING,
            MySqlValue::Bytes(b"plain".to_vec()),
        );
        assert_eq!(cell, CellValue::Text("plain".to_string()));
    }

    #[test]
    fn test_date_column_maps_to_date_cell() {
        let cell = MySqlBackend::cell_from_value(
            ColumnType::MYSQL_TYPE_DATE,
            MySqlValue::Date(2024, 1, 1, 0, 0, 0, 0),
        );
        assert_eq!(
            cell,
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn test_datetime_column_maps_to_datetime_cell() {
        let cell = MySqlBackend::cell_from_value(
            ColumnType::MYSQL_TYPE_DATETIME,
            MySqlValue::Date(2024, 3, 15, 10, 30, 0, 0),
        );
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_micro_opt(10, 30, 0, 0)
            .unwrap();
        assert_eq!(cell, CellValue::DateTime(expected));
    }

    #[test]
    fn test_negative_time_renders_with_sign() {
        let cell = MySqlBackend::cell_from_value(
            ColumnType::MYSQL_TYPE_TIME,
            MySqlValue::Time(true, 1, 2, 5, 30, 0),
        );
        assert_eq!(cell, CellValue::Text("-26:05:30".to_string()));
    }
}
