//! Per-method instruction rewriting
//!
//! [`rewrite_method`] is a single forward fold over a decoded instruction list.
//! It wraps every matched, unguarded call in a context-store `put`/`remove`
//! pair and leaves everything else untouched. Layout, pool indices and stack
//! depth are left to the assembler.

use crate::guard::{CallKind, GuardState};
use crate::injection::InjectionSpec;
use crate::pattern::{CallSitePattern, ContextStore};
use callerinfo_classfile::{Instruction, MemberRef};

/// Everything a rewrite needs besides the code itself
#[derive(Debug, Clone)]
pub struct RewriteRules {
    /// Calls to wrap
    pub targets: Vec<CallSitePattern>,
    /// `put`/`remove` symbols to emit
    pub store: ContextStore,
    /// Value template, key and toggles
    pub injection: InjectionSpec,
}

impl RewriteRules {
    /// Rules for the given targets with the SLF4J context store
    pub fn new(targets: Vec<CallSitePattern>, injection: InjectionSpec) -> Self {
        Self {
            targets,
            store: ContextStore::slf4j(),
            injection,
        }
    }

    /// Whether a call matches any target pattern
    pub fn is_target(&self, method: &MemberRef) -> bool {
        self.targets.iter().any(|pattern| pattern.matches(method))
    }
}

/// Transient state of one method rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRewriteState {
    /// Line of the most recent line marker, `-1` before the first one
    pub current_line: i32,
    /// Double-injection guard
    pub guard: GuardState,
    /// First string literal loaded after some call; survives until overwritten
    pub first_literal: Option<String>,
    /// String literals loaded since the last call
    pub literals_since_call: usize,
    /// Call sites wrapped so far
    pub count: usize,
}

impl Default for MethodRewriteState {
    fn default() -> Self {
        Self {
            current_line: -1,
            guard: GuardState::Idle,
            first_literal: None,
            literals_since_call: 0,
            count: 0,
        }
    }
}

impl MethodRewriteState {
    fn record_literal(&mut self, literal: &str) {
        if self.literals_since_call == 0 {
            self.first_literal = Some(literal.to_string());
            self.literals_since_call += 1;
        }
    }

    fn classify(&self, method: &MemberRef, rules: &RewriteRules) -> CallKind {
        if rules.is_target(method) {
            CallKind::Matched
        } else if rules.store.is_put(method)
            && self.first_literal.as_deref() == Some(rules.injection.key.as_str())
        {
            CallKind::GuardPut
        } else {
            CallKind::Other
        }
    }
}

/// Result of rewriting one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenMethod {
    /// The new instruction list
    pub instructions: Vec<Instruction>,
    /// Number of wrapped call sites
    pub call_sites: usize,
}

/// Rewrite one method body.
///
/// `class` is the internal name of the declaring class and `method` the method
/// name, both used for placeholder substitution. The injected `put` goes
/// directly before the call, after its labels and line markers, so jumps to
/// the call land on the injected code.
pub fn rewrite_method(
    instructions: &[Instruction],
    rules: &RewriteRules,
    class: &str,
    method: &str,
) -> RewrittenMethod {
    let injection = &rules.injection;
    let mut state = MethodRewriteState::default();
    let mut output = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        match instruction {
            Instruction::LineNumber(line) => {
                state.current_line = i32::from(*line);
                output.push(instruction.clone());
            }
            Instruction::Ldc {
                string: Some(literal),
                ..
            } => {
                state.record_literal(literal);
                output.push(instruction.clone());
            }
            Instruction::Invoke { method: called, .. } => {
                let kind = state.classify(called, rules);
                let wrap = kind == CallKind::Matched && state.guard.injects();

                if wrap {
                    state.count += 1;
                    if injection.inject {
                        let value = injection.substitute(class, method, state.current_line);
                        output.extend([
                            Instruction::push_string(injection.key.as_str()),
                            Instruction::push_string(value),
                            Instruction::invoke_static(rules.store.put().clone()),
                        ]);
                    }
                }
                output.push(instruction.clone());
                if wrap && injection.remove {
                    output.extend([
                        Instruction::push_string(injection.key.as_str()),
                        Instruction::invoke_static(rules.store.remove().clone()),
                    ]);
                }

                state.guard = state.guard.next(kind);
                state.literals_since_call = 0;
            }
            _ => output.push(instruction.clone()),
        }
    }

    RewrittenMethod {
        instructions: output,
        call_sites: state.count,
    }
}
