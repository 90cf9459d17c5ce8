use crate::compute::{RequestKey, Session};
use crate::entities::EntityId;
use crate::periods::Period;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the computation tree below a request evaluated in `session`.
/// Dependency edges are only recorded when the session runs with tracing on.
pub fn format_trace(session: &Session<'_>, variable: &str, entity: EntityId, period: Period) -> String {
    let mut tracer = Tracer { session, visited_at_level: HashMap::new(), output: String::new() };

    match session.variables().id_of(variable) {
        Ok(id) => {
            let root = RequestKey::new(id, entity, period);
            let _ = writeln!(tracer.output, "COMPUTATION TRACE for '{}':", session.describe(&root));
            let _ = writeln!(tracer.output, "--------------------------------------------------");
            tracer.trace_request(root, 1, "");
        }
        Err(e) => {
            let _ = writeln!(tracer.output, "Error: {}", e);
        }
    }
    tracer.output
}

struct Tracer<'s, 'a> {
    session: &'s Session<'a>,
    visited_at_level: HashMap<RequestKey, usize>,
    output: String,
}

impl<'s, 'a> Tracer<'s, 'a> {
    fn trace_request(&mut self, key: RequestKey, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&key) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(key, level);

        let session = self.session;
        let value = match session.ledger().get(&key) {
            Some(v) => v.to_string(),
            None => "<not computed>".to_string(),
        };
        let line_header = format!("[L{}] {} = {}", level, session.describe(&key), value);

        if session.is_input(&key) {
            let _ = writeln!(self.output, "{}{} -> Input", prefix, line_header);
            return;
        }
        let _ = writeln!(self.output, "{}{}", prefix, line_header);

        let children = session.dependencies(&key);
        self.recurse_children(prefix, children, level);
    }

    fn recurse_children(&mut self, prefix: &str, children: &[RequestKey], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            let full_prefix = format!("{}{}", stem, connector);
            self.trace_request(child, level + 1, &full_prefix);
        }
    }
}

fn build_child_stem(prefix: &str) -> String {
    prefix.replace("`--", "   ").replace("|--", "|  ")
}
