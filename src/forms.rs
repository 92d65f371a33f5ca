use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
};
use time::{macros::format_description, Date};

use crate::error::{AppError, AppResult};
use crate::registration::uploads::Upload;

/// A drained multipart body: text fields and named file parts.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

fn form_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body too large".into())
    } else {
        AppError::InvalidInput(format!("Malformed multipart body: {}", e.body_text()))
    }
}

impl FormData {
    pub async fn read(mut mp: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = mp.next_field().await.map_err(form_error)? {
            let Some(name) = field.name().map(|s| s.to_string()) else {
                continue;
            };
            match field.file_name().map(|s| s.to_string()) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "application/octet-stream".into());
                    let body = field.bytes().await.map_err(form_error)?;
                    // browsers send an empty part for an untouched file input
                    if filename.is_empty() && body.is_empty() {
                        continue;
                    }
                    form.files.insert(
                        name,
                        Upload {
                            filename,
                            content_type,
                            body,
                        },
                    );
                }
                None => {
                    let value = field.text().await.map_err(form_error)?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    /// Non-blank text value, trimmed.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required(&self, name: &str) -> AppResult<String> {
        self.text(name)
            .ok_or_else(|| AppError::InvalidInput(format!("{} is required", name)))
    }

    /// Raw value, untrimmed. For passwords.
    pub fn raw(&self, name: &str) -> AppResult<String> {
        self.fields
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| AppError::InvalidInput(format!("{} is required", name)))
    }

    pub fn parsed<T: std::str::FromStr>(&self, name: &str) -> AppResult<Option<T>> {
        self.text(name)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| AppError::InvalidInput(format!("Invalid value for {}", name)))
            })
            .transpose()
    }

    /// `YYYY-MM-DD`.
    pub fn date(&self, name: &str) -> AppResult<Option<Date>> {
        let format = format_description!("[year]-[month]-[day]");
        self.text(name)
            .map(|v| {
                Date::parse(&v, &format).map_err(|_| {
                    AppError::InvalidInput(format!("{} must be a YYYY-MM-DD date", name))
                })
            })
            .transpose()
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn with_fields(pairs: &[(&str, &str)]) -> Self {
        FormData {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Gender;
    use time::macros::date;

    #[test]
    fn typed_accessors() {
        let form = FormData::with_fields(&[
            ("name", "  Ada "),
            ("blank", "   "),
            ("gender", "Female"),
            ("birth_date", "1990-05-01"),
            ("bad_date", "01/05/1990"),
        ]);
        assert_eq!(form.text("name").as_deref(), Some("Ada"));
        assert_eq!(form.text("blank"), None);
        assert!(form.required("blank").is_err());
        assert_eq!(form.parsed::<Gender>("gender").unwrap(), Some(Gender::Female));
        assert_eq!(form.date("birth_date").unwrap(), Some(date!(1990 - 05 - 01)));
        assert!(form.date("bad_date").is_err());
        assert_eq!(form.date("missing").unwrap(), None);
    }
}
