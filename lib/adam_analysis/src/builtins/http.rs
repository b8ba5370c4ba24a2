//! Models of the Apache HTTP client, the network sinks.

use super::java_lang::{content, CONTENT};
use super::{BuiltinClass, BuiltinEnv};
use crate::errors::AnalysisResult;
use crate::tags::{Tag, TagSet};
use crate::value::AliasSet;
use adam_code::Name;

const HTTP_CLIENT: &str = "Lorg/apache/http/client/HttpClient;";
const DEFAULT_HTTP_CLIENT: &str = "Lorg/apache/http/impl/client/DefaultHttpClient;";
const HTTP_GET: &str = "Lorg/apache/http/client/methods/HttpGet;";
const HTTP_POST: &str = "Lorg/apache/http/client/methods/HttpPost;";
const STRING_ENTITY: &str = "Lorg/apache/http/entity/StringEntity;";

const URI: &str = "$uri";
const ENTITY: &str = "$entity";

pub struct Http;

impl BuiltinClass for Http {
    fn provides(&self) -> &[&'static str] {
        &[
            HTTP_CLIENT,
            DEFAULT_HTTP_CLIENT,
            HTTP_GET,
            HTTP_POST,
            STRING_ENTITY,
        ]
    }

    fn layout(&self, class: &str) -> Vec<Name> {
        match class {
            HTTP_GET => vec![Name::new(URI)],
            HTTP_POST => vec![Name::new(URI), Name::new(ENTITY)],
            STRING_ENTITY => vec![Name::new(CONTENT)],
            _ => Vec::new(),
        }
    }

    fn invoke(
        &self,
        env: &mut BuiltinEnv,
        class: &str,
        name: &str,
        _proto: &str,
    ) -> AnalysisResult<bool> {
        match (class, name) {
            (HTTP_CLIENT | DEFAULT_HTTP_CLIENT, "<init>") => (),
            (HTTP_CLIENT | DEFAULT_HTTP_CLIENT, "execute") => {
                let tags = env.args_tags(0);
                let sink = format!("{class}->execute");
                env.report_if(Tag::FILE_CONTENT, tags, &sink);
                env.set_result(AliasSet::unknown());
            }

            (HTTP_GET | HTTP_POST, "<init>") => {
                let receiver = env.arg(0)?.clone();
                let tags = env.args_tags(1);
                env.put_field(&receiver, URI, &content(&tags))?;
            }
            (HTTP_POST, "setEntity") => {
                let receiver = env.arg(0)?.clone();
                let entity = env.arg(1)?.clone();
                env.put_field(&receiver, ENTITY, &entity)?;
            }
            (STRING_ENTITY, "<init>") => {
                let receiver = env.arg(0)?.clone();
                let tags = env.args_tags(1);
                env.put_field(&receiver, CONTENT, &content(&tags))?;
            }
            (HTTP_GET | HTTP_POST, "getURI") => {
                let receiver = env.arg(0)?.clone();
                let uri = env.get_field(&receiver, URI)?;
                env.set_result(AliasSet::unknown().with_tags(uri.tags()));
            }
            (HTTP_GET | HTTP_POST, "abort") => env.set_result(content(&TagSet::new())),

            _ => return Ok(false),
        }
        Ok(true)
    }
}
