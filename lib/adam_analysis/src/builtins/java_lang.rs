//! Models of `java.lang` objects and strings.
//!
//! Strings and string builders keep their characters in a `$content` field:
//! an unknown primitive carrying the tags of everything the string was built
//! from.

use super::{BuiltinClass, BuiltinEnv};
use crate::errors::AnalysisResult;
use crate::prim::Prim;
use crate::tags::TagSet;
use crate::value::AliasSet;
use adam_code::Name;

const OBJECT: &str = "Ljava/lang/Object;";
const STRING: &str = "Ljava/lang/String;";
const STRING_BUILDER: &str = "Ljava/lang/StringBuilder;";
const STRING_BUFFER: &str = "Ljava/lang/StringBuffer;";

pub(super) const CONTENT: &str = "$content";

pub struct JavaLang;

pub(super) fn content(tags: &TagSet) -> AliasSet {
    AliasSet::from_prim(Prim::any()).with_tags(tags)
}

/// Returns a new string built from the arguments from `from` on.
pub(super) fn new_string(env: &mut BuiltinEnv, from: usize) -> AnalysisResult<()> {
    let tags = env.args_tags(from);
    let string = env.new_with_content(STRING, CONTENT, &tags)?;
    env.set_result(string);
    Ok(())
}

fn append(env: &mut BuiltinEnv) -> AnalysisResult<()> {
    let receiver = env.arg(0)?.clone();
    let tags = env.args_tags(1);
    let old = env.get_field(&receiver, CONTENT)?;
    let new = old.join(&content(&tags), env.frame.cap());
    env.put_field(&receiver, CONTENT, &new)?;
    env.set_result(receiver);
    Ok(())
}

impl BuiltinClass for JavaLang {
    fn provides(&self) -> &[&'static str] {
        &[OBJECT, STRING, STRING_BUILDER, STRING_BUFFER]
    }

    fn layout(&self, class: &str) -> Vec<Name> {
        match class {
            STRING | STRING_BUILDER | STRING_BUFFER => vec![Name::new(CONTENT)],
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
            (OBJECT, "<init>") => (),
            (_, "hashCode" | "compareTo") => env.set_result(AliasSet::from_prim(Prim::SIGNS)),
            (_, "length") => env.set_result(AliasSet::from_prim(Prim::ZERO | Prim::POS)),
            (_, "equals" | "isEmpty" | "contains" | "startsWith" | "endsWith") => {
                env.set_result(AliasSet::from_prim(Prim::from_const(0) | Prim::from_const(1)));
            }
            (OBJECT, "toString") => new_string(env, 0)?,

            (STRING | STRING_BUILDER | STRING_BUFFER, "<init>") => {
                let receiver = env.arg(0)?.clone();
                let tags = env.args_tags(1);
                env.put_field(&receiver, CONTENT, &content(&tags))?;
            }
            (
                STRING,
                "valueOf" | "format" | "copyValueOf" | "concat" | "substring" | "trim"
                | "toLowerCase" | "toUpperCase" | "replace" | "intern" | "toString",
            ) => new_string(env, 0)?,
            (STRING, "charAt" | "indexOf") => {
                let tags = env.args_tags(0);
                env.set_result(content(&tags));
            }

            (STRING_BUILDER | STRING_BUFFER, "append" | "insert") => append(env)?,
            (STRING_BUILDER | STRING_BUFFER, "toString") => new_string(env, 0)?,

            _ => return Ok(false),
        }
        Ok(true)
    }
}
