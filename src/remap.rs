use crate::config::RemapRule;

const SECRET_NAME_PLACEHOLDER: &str = "{{secretName}}";

/// Maps a secret data key to its destination file name.
///
/// Rules are folded in configured order: a rule whose `name` equals the
/// current key replaces it with the rendered template, and the result feeds
/// the next rule. Without rules the key is used as-is.
pub fn remap(key: &str, rules: &[RemapRule], secret_name: &str) -> String {
    rules.iter().fold(key.to_owned(), |current, rule| {
        if current == rule.name {
            render(&rule.value, secret_name)
        } else {
            current
        }
    })
}

fn render(template: &str, secret_name: &str) -> String {
    template.replace(SECRET_NAME_PLACEHOLDER, secret_name)
}
