//! Caption template expansion.
//!
//! A template is plain text with `$(Name)` or `$(Name 'text')` tokens. The
//! quoted text is only appended when the variable expands to something, so
//! separators attached to an empty value disappear with it. Unknown names are
//! replaced by the bare name so typos stay visible.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::logging::Logger;
use crate::variables::{ExpansionContext, Variable};

/// Upper bound on substitutions whose value itself contains `$`. Any other
/// substitution removes a `$` from the caption, so only these can keep
/// producing new tokens.
pub const MAX_EXPANSIONS: usize = 256;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\(\s*([a-zA-Z]+)\s*(?:'(.*?)')?\s*\)").expect("token pattern is valid")
});

/// One `$(...)` occurrence found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'t> {
    pub start: usize,
    pub end: usize,
    pub name: &'t str,
    pub text: &'t str,
}

/// Returns the leftmost token in `input`, if any.
pub fn find_token(input: &str) -> Option<Token<'_>> {
    let captures = TOKEN.captures(input)?;
    let whole = captures.get(0)?;
    let name = captures.get(1)?.as_str();
    let text = captures.get(2).map(|m| m.as_str()).unwrap_or("");
    Some(Token {
        start: whole.start(),
        end: whole.end(),
        name,
        text,
    })
}

/// Expands templates against documents, logging through `logger`.
#[derive(Debug, Clone)]
pub struct TemplateExpander {
    logger: Logger,
}

impl Default for TemplateExpander {
    fn default() -> Self {
        Self::new(Logger::disabled())
    }
}

impl TemplateExpander {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.scoped("variables"),
        }
    }

    pub fn expand(&self, context: &ExpansionContext<'_>, template: &str) -> String {
        let mut caption = template.to_string();

        let mut reentrant = 0;
        loop {
            let Some(token) = find_token(&caption) else {
                self.logger.trace(format_args!(
                    "caption for {} is '{}'",
                    context.document.path(),
                    caption
                ));
                return caption;
            };

            let replacement = self.replacement(context, &token);
            if replacement.contains('$') {
                if reentrant == MAX_EXPANSIONS {
                    self.logger.warn(format_args!(
                        "template '{}' keeps producing variables after {} substitutions, giving up",
                        template, MAX_EXPANSIONS
                    ));
                    return caption;
                }
                reentrant += 1;
            }
            let (start, end) = (token.start, token.end);
            caption.replace_range(start..end, &replacement);
        }
    }

    fn replacement(&self, context: &ExpansionContext<'_>, token: &Token<'_>) -> String {
        let Some(variable) = Variable::from_name(token.name) else {
            self.logger
                .variables(format_args!("variable {} not found", token.name));
            return token.name.to_string();
        };

        let mut value = variable.expand(context);
        if !value.is_empty() {
            value.push_str(token.text);
        }
        self.logger
            .variables(format_args!("variable {} replaced by '{}'", variable, value));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValues;
    use crate::testing::{TestDocument, TestProject, TestSolution, TestTreeItem};

    fn expand_for(document: &TestDocument, template: &str) -> String {
        let options = OptionValues::default();
        let solution = TestSolution::new(false);
        TemplateExpander::default().expand(
            &ExpansionContext::new(document, &options, &solution),
            template,
        )
    }

    fn check(template: &str, expected: &str) {
        assert_eq!(
            expand_for(&TestDocument::at(""), template),
            expected,
            "template {template:?}"
        );
    }

    fn check_same(template: &str) {
        check(template, template);
    }

    #[test]
    fn text_without_variables_is_unchanged() {
        check_same("");
        check_same("1");
        check_same("123 word");
    }

    #[test]
    fn broken_syntax_is_left_alone() {
        check_same("$word");
        check_same("$(word");
        check_same("123 $(word");
        check_same("$word)");
        check_same("(word)");
        check_same("$(word 't'");
    }

    #[test]
    fn bad_names_are_not_tokens() {
        for template in [
            "$(_word)",
            "$(1word)",
            "$(-word)",
            "$(wo_rd)",
            "$(wo1rd)",
            "$(woo-rd)",
            "$(word_)",
            "$(word1)",
            "$(word-)",
            "$(_word 'text')",
            "$(1word 'text')",
            "$(-word 'text')",
            "$($word))",
        ] {
            check_same(template);
        }
    }

    #[test]
    fn unknown_variables_become_their_name() {
        check("$(bad)", "bad");
        check("$(bad 'text')", "bad");
        check("$( bad  'text' )", "bad");
        check("$($(bad))", "bad");
        check("$($(bad 'text'))", "bad");
        check("$($(bad) 'text')", "bad");
        check("$($(bad)", "$(bad");
        check("$$(bad))", "$bad)");
    }

    #[test]
    fn suffix_is_dropped_for_empty_values() {
        let document = TestDocument::at("");
        assert_eq!(expand_for(&document, "$(ParentDir 'text')"), "");
        assert_eq!(expand_for(&document, "a$(ProjectName ': ')b"), "ab");
    }

    #[test]
    fn substituted_text_is_scanned_again() {
        let document = TestDocument::at("/src/lib/mod.rs");
        assert_eq!(
            expand_for(&document, "$(ParentDir ' $(Filename) ')x"),
            "lib mod.rs x"
        );
    }

    #[test]
    fn default_template_renders_project_folders_and_file() {
        let root = TestTreeItem::root("proj");
        let a = TestTreeItem::folder("a", &root);
        let b = TestTreeItem::folder("b", &a);
        let file = TestTreeItem::file("f.ext", &b);
        let document = TestDocument::at("/work/proj/a/b/f.ext")
            .with_project(TestProject::new("proj", false))
            .with_tree_item(file);

        assert_eq!(
            expand_for(&document, crate::options::defaults::TEMPLATE),
            "proj:a/bf.ext"
        );
        assert_eq!(
            expand_for(&document, "$(ProjectName ':')$(FolderPath '/')$(Filename)"),
            "proj:a/b/f.ext"
        );
    }

    #[test]
    fn self_replicating_values_stop_at_the_limit() {
        let document = TestDocument::at("$(FullPath)");
        let caption = expand_for(&document, "$(FullPath)");
        assert_eq!(caption, "$(FullPath)");
    }

    #[test]
    fn long_templates_expand_every_token() {
        let document = TestDocument::at("/a/f.rs");
        let template = "$(Filename)".repeat(MAX_EXPANSIONS + 44);
        let caption = expand_for(&document, &template);
        assert_eq!(caption, "f.rs".repeat(MAX_EXPANSIONS + 44));
        assert!(find_token(&caption).is_none());
    }

    #[test]
    fn dollar_signs_in_values_count_toward_the_limit() {
        let document = TestDocument::at("/a/$x.rs");
        let template = "$(Filename)".repeat(MAX_EXPANSIONS + 1);
        let caption = expand_for(&document, &template);
        assert_eq!(
            caption,
            format!("{}$(Filename)", "$x.rs".repeat(MAX_EXPANSIONS))
        );
    }

    #[test]
    fn find_token_reports_span_name_and_text() {
        let token = find_token("ab$(Filename ' - ')cd").expect("token");
        assert_eq!(token.start, 2);
        assert_eq!(token.end, 19);
        assert_eq!(token.name, "Filename");
        assert_eq!(token.text, " - ");
        assert!(find_token("no tokens").is_none());
    }
}
