use crate::llm::{Message, Role};

/// Turns a conversation history into the single `inputs` string a
/// text-generation endpoint expects.
pub trait PromptFormatter: Send + Sync {
    fn format(&self, messages: &[Message]) -> String;
}

impl<F> PromptFormatter for F
where
    F: Fn(&[Message]) -> String + Send + Sync,
{
    fn format(&self, messages: &[Message]) -> String {
        self(messages)
    }
}

/// `Role: content` lines followed by an open `Assistant:` turn. A lone
/// message is sent as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct RolePrefixFormatter;

impl PromptFormatter for RolePrefixFormatter {
    fn format(&self, messages: &[Message]) -> String {
        if let [only] = messages {
            return only.content.clone();
        }
        let mut out = messages
            .iter()
            .map(|m| format!("{}: {}", label(m.role), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        out.push_str("\nAssistant:");
        out
    }
}

fn label(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_message_passes_through() {
        let f = RolePrefixFormatter;
        assert_eq!(f.format(&[Message::user("What is Rust?")]), "What is Rust?");
    }

    #[test]
    fn history_gets_role_prefixes() {
        let f = RolePrefixFormatter;
        let msgs = vec![
            Message::system("Be terse."),
            Message::user("Hi"),
            Message::assistant("Hello."),
            Message::user("Bye"),
        ];
        assert_eq!(
            f.format(&msgs),
            "System: Be terse.\nUser: Hi\nAssistant: Hello.\nUser: Bye\nAssistant:"
        );
    }

    #[test]
    fn closures_are_formatters() {
        let f = |m: &[Message]| m.iter().map(|m| m.content.as_str()).collect::<String>();
        assert_eq!(f.format(&[Message::user("a"), Message::user("b")]), "ab");
    }
}
