//! `ListObjectsV2` response parsing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::StoreError;
use crate::{ListPage, ObjectMeta};

#[derive(Default)]
struct PartialObject {
    key: String,
    size: u64,
    etag: String,
    last_modified: Option<DateTime<Utc>>,
}

/// Parse a `ListBucketResult` document into a [`ListPage`].
///
/// # Errors
///
/// Returns [`StoreError::Xml`] on malformed XML and
/// [`StoreError::InvalidResponse`] when the listing claims to be truncated
/// without a continuation token.
pub(crate) fn parse_list_objects(xml: &str) -> Result<ListPage, StoreError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut objects = Vec::new();
    let mut current = PartialObject::default();
    let mut in_contents = false;
    let mut current_tag = String::new();
    let mut truncated = false;
    let mut next_token: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = std::str::from_utf8(e.local_name().as_ref())
                    .unwrap_or("")
                    .to_string();
                if name == "Contents" {
                    in_contents = true;
                    current = PartialObject::default();
                }
                current_tag = name;
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Contents" && in_contents {
                    in_contents = false;
                    let object = std::mem::take(&mut current);
                    if !object.key.is_empty() {
                        objects.push(ObjectMeta {
                            key: object.key,
                            size: object.size,
                            version: object.etag,
                            last_modified: object.last_modified,
                            metadata: BTreeMap::new(),
                        });
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape()?.into_owned();
                if in_contents {
                    match current_tag.as_str() {
                        "Key" => current.key = text,
                        "Size" => current.size = text.parse().unwrap_or(0),
                        "ETag" => current.etag = text,
                        "LastModified" => {
                            current.last_modified = DateTime::parse_from_rfc3339(&text)
                                .ok()
                                .map(|ts| ts.with_timezone(&Utc));
                        }
                        _ => {}
                    }
                } else {
                    match current_tag.as_str() {
                        "IsTruncated" => truncated = text == "true",
                        "NextContinuationToken" => next_token = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StoreError::Xml(e)),
            _ => {}
        }
    }

    let next_continuation = match (truncated, next_token) {
        (true, Some(token)) if !token.is_empty() => Some(token),
        (true, _) => {
            return Err(StoreError::InvalidResponse(
                "truncated listing without NextContinuationToken".to_string(),
            ))
        }
        (false, _) => None,
    };

    Ok(ListPage {
        objects,
        next_continuation,
    })
}
