//! Whole-class rewriting

use crate::error::{RewriteError, RewriteResult};
use crate::rewriter::{rewrite_method, RewriteRules};
use callerinfo_classfile::{ClassFile, CodeAttribute, MethodBody};
use tracing::{debug, trace};

/// Outcome of rewriting one class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenArtifact {
    /// Internal name of the class
    pub class_name: String,
    /// Class bytes; identical to the input when nothing changed
    pub bytes: Vec<u8>,
    /// Number of wrapped call sites
    pub call_sites: usize,
    /// Whether any method body changed
    pub changed: bool,
}

struct DecodedMethod {
    method: usize,
    attribute: usize,
    name: String,
    signature: String,
    body: MethodBody,
}

/// Rewrite every method of a class file.
///
/// All method bodies are decoded before anything is modified, so a malformed
/// method rejects the whole class. Only changed bodies are re-assembled.
pub fn rewrite_artifact(bytes: &[u8], rules: &RewriteRules) -> RewriteResult<RewrittenArtifact> {
    let mut class = ClassFile::decode(bytes)?;
    let class_name = class.name()?;
    debug!("Searching for log statements in {}", class_name);

    let mut decoded = Vec::new();
    for (method_index, method) in class.methods.iter().enumerate() {
        let Some(attribute) = method.code_attribute_index(&class.constant_pool) else {
            continue;
        };
        let (name, descriptor) = class.method_signature(method)?;
        let signature = format!("{name}{descriptor}");
        let body = CodeAttribute::decode(&method.attributes[attribute].info)
            .and_then(|code| MethodBody::decode(&code, &class.constant_pool))
            .map_err(|source| RewriteError::Decode {
                method: signature.clone(),
                source,
            })?;
        decoded.push(DecodedMethod {
            method: method_index,
            attribute,
            name,
            signature,
            body,
        });
    }

    let mut call_sites = 0;
    let mut changed = Vec::new();
    for mut method in decoded {
        let rewritten = rewrite_method(&method.body.instructions, rules, &class_name, &method.name);
        if rewritten.call_sites == 0 || rewritten.instructions == method.body.instructions {
            continue;
        }
        trace!(
            "{}#{}: {} call sites",
            class_name,
            method.signature,
            rewritten.call_sites
        );
        call_sites += rewritten.call_sites;
        method.body.instructions = rewritten.instructions;
        changed.push(method);
    }

    if changed.is_empty() {
        debug!("{} - no log statements rewritten", class_name);
        return Ok(RewrittenArtifact {
            class_name,
            bytes: bytes.to_vec(),
            call_sites: 0,
            changed: false,
        });
    }

    for method in &changed {
        let code = method
            .body
            .assemble(&mut class.constant_pool)
            .map_err(|source| RewriteError::Assemble {
                method: method.signature.clone(),
                source,
            })?;
        class.methods[method.method].attributes[method.attribute].info = code.encode();
    }

    debug!(
        "{} - {} log statements rewritten in {} methods",
        class_name,
        call_sites,
        changed.len()
    );
    Ok(RewrittenArtifact {
        class_name,
        bytes: class.encode(),
        call_sites,
        changed: true,
    })
}
