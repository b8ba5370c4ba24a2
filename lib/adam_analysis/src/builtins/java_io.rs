//! Models of `java.io` files, streams and readers.
//!
//! A file carries the tags of its name in `$name`, with the `file-name` tag
//! added. Streams opened on a file hold in `$content` an unknown value tagged
//! `file-content` and the tags of the file name; wrapping readers share the
//! content of the wrapped stream.

use super::java_lang::{content, CONTENT};
use super::{BuiltinClass, BuiltinEnv};
use crate::errors::AnalysisResult;
use crate::tags::{Tag, TagSet};
use adam_code::Name;

const FILE: &str = "Ljava/io/File;";
const FILE_INPUT_STREAM: &str = "Ljava/io/FileInputStream;";
const FILE_READER: &str = "Ljava/io/FileReader;";
const INPUT_STREAM_READER: &str = "Ljava/io/InputStreamReader;";
const BUFFERED_READER: &str = "Ljava/io/BufferedReader;";

const NAME: &str = "$name";

pub struct JavaIo;

/// Tags of a file name given as argument `i`, `file-name` included.
fn file_name_tags(env: &BuiltinEnv, i: usize) -> TagSet {
    let mut tags = env.args_tags(i);
    tags.insert(Tag::FILE_NAME);
    tags
}

impl BuiltinClass for JavaIo {
    fn provides(&self) -> &[&'static str] {
        &[
            FILE,
            FILE_INPUT_STREAM,
            FILE_READER,
            INPUT_STREAM_READER,
            BUFFERED_READER,
        ]
    }

    fn layout(&self, class: &str) -> Vec<Name> {
        match class {
            FILE => vec![Name::new(NAME)],
            FILE_INPUT_STREAM | FILE_READER => vec![Name::new(NAME), Name::new(CONTENT)],
            INPUT_STREAM_READER | BUFFERED_READER => vec![Name::new(CONTENT)],
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
            (FILE, "<init>") => {
                let receiver = env.arg(0)?.clone();
                let tags = file_name_tags(env, 1);
                env.put_field(&receiver, NAME, &content(&tags))?;
            }
            (FILE, "getName" | "getPath" | "getAbsolutePath" | "toString") => {
                let receiver = env.arg(0)?.clone();
                let tags = env.get_field(&receiver, NAME)?.tags().clone();
                let string = env.new_with_content("Ljava/lang/String;", CONTENT, &tags)?;
                env.set_result(string);
            }
            (FILE, "exists" | "isFile" | "isDirectory" | "canRead" | "delete") => {
                env.set_result(content(&TagSet::new()));
            }

            (FILE_INPUT_STREAM | FILE_READER, "<init>") => {
                let receiver = env.arg(0)?.clone();
                let mut tags = file_name_tags(env, 1);
                env.put_field(&receiver, NAME, &content(&tags))?;
                tags.insert(Tag::FILE_CONTENT);
                env.put_field(&receiver, CONTENT, &content(&tags))?;
            }
            (INPUT_STREAM_READER | BUFFERED_READER, "<init>") => {
                let receiver = env.arg(0)?.clone();
                let wrapped = env.arg(1)?.clone();
                let inner = env.get_field(&wrapped, CONTENT)?;
                env.put_field(&receiver, CONTENT, &inner)?;
            }

            (_, "read") => {
                let receiver = env.arg(0)?.clone();
                let data = env.get_field(&receiver, CONTENT)?;
                // read(buffer, ...) fills the buffer
                if let Ok(buffer) = env.arg(1).cloned() {
                    let old = env.get_field(&buffer, "$elements")?;
                    let new = old.join(&data, env.frame.cap());
                    env.put_field(&buffer, "$elements", &new)?;
                }
                env.set_result(content(data.tags()));
            }
            (BUFFERED_READER, "readLine") => {
                let receiver = env.arg(0)?.clone();
                let data = env.get_field(&receiver, CONTENT)?;
                let line = env.new_with_content("Ljava/lang/String;", CONTENT, data.tags())?;
                env.set_result(line);
            }
            (_, "close" | "ready" | "skip" | "available") => {
                env.set_result(content(&TagSet::new()));
            }

            _ => return Ok(false),
        }
        Ok(true)
    }
}
