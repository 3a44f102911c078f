//! `multipart/form-data` encoding for upload requests.
//!
//! The boundary is fixed when the form is created so the content type and the
//! encoded body always agree, no matter which side builds the header.

use uuid::Uuid;

#[derive(Debug, Clone)]
enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        data: Vec<u8>,
    },
}

/// An ordered multipart form.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("----backoffice-{}", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for part in &self.parts {
            out.extend_from_slice(self.part_header(part).as_bytes());
            match part {
                Part::Text { value, .. } => out.extend_from_slice(value.as_bytes()),
                Part::File { data, .. } => out.extend_from_slice(data),
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }

    pub fn encoded_len(&self) -> usize {
        let parts: usize = self
            .parts
            .iter()
            .map(|part| {
                let payload = match part {
                    Part::Text { value, .. } => value.len(),
                    Part::File { data, .. } => data.len(),
                };
                self.part_header(part).len() + payload + 2
            })
            .sum();
        parts + self.boundary.len() + 6
    }

    fn part_header(&self, part: &Part) -> String {
        match part {
            Part::Text { name, .. } => format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
                self.boundary,
                escape_quoted(name)
            ),
            Part::File {
                name,
                file_name,
                content_type,
                ..
            } => format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary,
                escape_quoted(name),
                escape_quoted(file_name),
                content_type
            ),
        }
    }
}

// Quotes and line breaks would end the header parameter early.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
