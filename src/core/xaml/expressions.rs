use std::collections::HashSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What an expression is used for, inferred from the attribute that
/// carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionRole {
    Condition,
    Assignment,
    Message,
    Timeout,
    General,
}

/// An expression found in an activity's attributes or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    /// Attribute (or pseudo-attribute) the expression came from
    pub source: String,
    /// Raw expression text as written
    pub text: String,
    pub role: ExpressionRole,
}

/// Lexical detector for embedded DSL expressions and the variables they
/// reference.
///
/// This is pattern matching, not an expression-language parser; the
/// indicator patterns were collected from real workflows and make no
/// completeness claim.
pub struct ExpressionDetector {
    method_call: Regex,
    bracket_name: Regex,
    dotted_prefix: Regex,
    assignment_lhs: Regex,
    adjacent_ident: Regex,
    known_functions: HashSet<&'static str>,
    denylist: HashSet<&'static str>,
}

impl ExpressionDetector {
    pub fn new() -> Self {
        let method_call = Regex::new(r"\b[A-Za-z_]\w*\.[A-Za-z_]\w*\s*\(")
            .expect("method call pattern");
        let bracket_name = Regex::new(r"\[\s*([A-Za-z_]\w*)\s*\]").expect("bracket pattern");
        let dotted_prefix = Regex::new(r"\b([A-Za-z_]\w*)\s*\.").expect("dotted pattern");
        let assignment_lhs =
            Regex::new(r"^\s*([A-Za-z_]\w*)\s*=[^=]").expect("assignment pattern");
        let adjacent_ident =
            Regex::new(r"[(,]\s*([A-Za-z_]\w*)\s*[,)]").expect("adjacent pattern");

        let known_functions: HashSet<&'static str> = [
            "CStr", "CInt", "CBool", "CDbl", "CDate", "CType", "DirectCast", "IIf", "IsNothing",
        ]
        .into_iter()
        .collect();

        // VB/C# keywords and framework roots that must never surface as
        // referenced workflow variables.
        let denylist: HashSet<&'static str> = [
            "If", "Then", "Else", "ElseIf", "End", "New", "Not", "And", "Or", "AndAlso",
            "OrElse", "Is", "IsNot", "Nothing", "True", "False", "In", "Of", "To", "For",
            "Each", "While", "Select", "Case", "Dim", "As", "Sub", "Function", "Return",
            "var", "new", "null", "true", "false", "is", "as",
            "String", "Integer", "Int32", "Long", "Double", "Boolean", "Object", "Decimal",
            "DateTime", "TimeSpan", "Guid", "Array", "List", "Dictionary", "Convert",
            "System", "Math", "Path", "File", "Directory", "Environment", "Regex", "IO",
            "CStr", "CInt", "CBool", "CDbl", "CDate", "CType", "DirectCast", "IIf",
            "IsNothing", "NewLine", "Format", "Join", "Split", "Trim", "ToString",
            "Substring", "Replace", "Contains", "Count", "Length", "Rows", "Columns",
        ]
        .into_iter()
        .collect();

        Self {
            method_call,
            bracket_name,
            dotted_prefix,
            assignment_lhs,
            adjacent_ident,
            known_functions,
            denylist,
        }
    }

    /// Whether a raw attribute/text value looks like a DSL expression.
    pub fn is_expression(&self, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            return true;
        }

        if self.method_call.is_match(trimmed) {
            return true;
        }

        if trimmed.contains("New ") {
            return true;
        }

        if trimmed.contains('=') {
            return true;
        }

        self.known_functions
            .iter()
            .any(|f| trimmed.contains(&format!("{}(", f)))
    }

    /// Classify an expression's role from the attribute name carrying it.
    pub fn classify_role(&self, attribute_name: &str) -> ExpressionRole {
        if attribute_name.contains("Condition") {
            ExpressionRole::Condition
        } else if attribute_name == "To" || attribute_name.contains("Assign") {
            ExpressionRole::Assignment
        } else if attribute_name.contains("Message") || attribute_name.contains("Text") {
            ExpressionRole::Message
        } else if attribute_name.contains("Timeout") {
            ExpressionRole::Timeout
        } else {
            ExpressionRole::General
        }
    }

    /// Extract the workflow-variable names an expression appears to
    /// reference. Sorted and deduplicated.
    pub fn extract_variable_references(&self, value: &str) -> Vec<String> {
        let mut found: HashSet<String> = HashSet::new();

        for cap in self.bracket_name.captures_iter(value) {
            found.insert(cap[1].to_string());
        }

        if let Some(cap) = self.assignment_lhs.captures(value) {
            found.insert(cap[1].to_string());
        }

        for cap in self.dotted_prefix.captures_iter(value) {
            found.insert(cap[1].to_string());
        }

        for cap in self.adjacent_ident.captures_iter(value) {
            found.insert(cap[1].to_string());
        }

        let mut names: Vec<String> = found
            .into_iter()
            .filter(|name| !self.denylist.contains(name.as_str()))
            .collect();
        names.sort();
        names
    }
}

impl Default for ExpressionDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_enclosed_is_expression() {
        let detector = ExpressionDetector::new();
        assert!(detector.is_expression("[currentRow]"));
        assert!(detector.is_expression("[Path.Combine(dir, \"Sub.xaml\")]"));
        assert!(!detector.is_expression("Just a label"));
        assert!(!detector.is_expression(""));
    }

    #[test]
    fn test_method_calls_and_constructors_are_expressions() {
        let detector = ExpressionDetector::new();
        assert!(detector.is_expression("String.Format(\"{0}\", total)"));
        assert!(detector.is_expression("New Dictionary(Of String, Object)"));
        assert!(detector.is_expression("counter = counter + 1"));
        assert!(detector.is_expression("CStr(amount)"));
    }

    #[test]
    fn test_role_classification() {
        let detector = ExpressionDetector::new();
        assert_eq!(detector.classify_role("Condition"), ExpressionRole::Condition);
        assert_eq!(detector.classify_role("LoopCondition"), ExpressionRole::Condition);
        assert_eq!(detector.classify_role("To"), ExpressionRole::Assignment);
        assert_eq!(detector.classify_role("Message"), ExpressionRole::Message);
        assert_eq!(detector.classify_role("TimeoutMS"), ExpressionRole::Timeout);
        assert_eq!(detector.classify_role("Source"), ExpressionRole::General);
    }

    #[test]
    fn test_extracts_bracket_and_dotted_references() {
        let detector = ExpressionDetector::new();
        let refs = detector.extract_variable_references("[orderTotal]");
        assert_eq!(refs, vec!["orderTotal"]);

        let refs = detector.extract_variable_references("invoiceTable.Rows.Count");
        assert_eq!(refs, vec!["invoiceTable"]);
    }

    #[test]
    fn test_extracts_assignment_lhs_and_call_arguments() {
        let detector = ExpressionDetector::new();
        let refs = detector.extract_variable_references("total = subtotal + tax");
        assert!(refs.contains(&"total".to_string()));

        let refs = detector.extract_variable_references("String.Join(\",\", (items, extras))");
        assert!(refs.contains(&"items".to_string()));
        assert!(refs.contains(&"extras".to_string()));
    }

    #[test]
    fn test_denylist_filters_framework_names() {
        let detector = ExpressionDetector::new();
        let refs = detector.extract_variable_references("Path.Combine(baseDir.ToString(), \"Sub.xaml\")");
        assert!(!refs.contains(&"Path".to_string()));
        assert!(refs.contains(&"baseDir".to_string()));

        let refs = detector.extract_variable_references("[Nothing]");
        assert!(refs.is_empty());
    }
}
