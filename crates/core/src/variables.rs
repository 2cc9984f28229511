//! Variables available inside caption templates.
//! 標題樣板中可用的變數。

use std::fmt;

use crate::options::OptionValues;
use crate::ports::{Document, Solution};

/// Everything a variable may look at while expanding.
#[derive(Clone, Copy)]
pub struct ExpansionContext<'a> {
    pub document: &'a dyn Document,
    pub options: &'a OptionValues,
    pub solution: &'a dyn Solution,
}

impl<'a> ExpansionContext<'a> {
    pub fn new(
        document: &'a dyn Document,
        options: &'a OptionValues,
        solution: &'a dyn Solution,
    ) -> Self {
        Self {
            document,
            options,
            solution,
        }
    }
}

/// Registered template variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    ProjectName,
    ParentDir,
    Filename,
    FullPath,
    FolderPath,
    ParentFolder,
}

impl Variable {
    pub const ALL: [Variable; 6] = [
        Variable::ProjectName,
        Variable::ParentDir,
        Variable::Filename,
        Variable::FullPath,
        Variable::FolderPath,
        Variable::ParentFolder,
    ];

    /// Looks up a variable by its exact, case-sensitive name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|variable| variable.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variable::ProjectName => "ProjectName",
            Variable::ParentDir => "ParentDir",
            Variable::Filename => "Filename",
            Variable::FullPath => "FullPath",
            Variable::FolderPath => "FolderPath",
            Variable::ParentFolder => "ParentFolder",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Variable::ProjectName => "name of the project owning the document",
            Variable::ParentDir => "name of the directory containing the file on disk",
            Variable::Filename => "file name, including the extension",
            Variable::FullPath => "full path of the file",
            Variable::FolderPath => "folders between the project and the document, joined by '/'",
            Variable::ParentFolder => "closest folder containing the document in the project",
        }
    }

    pub fn expand(&self, context: &ExpansionContext<'_>) -> String {
        match self {
            Variable::ProjectName => project_name(context),
            Variable::ParentDir => parent_dir(&context.document.path()),
            Variable::Filename => filename(&context.document.path()),
            Variable::FullPath => context.document.path(),
            Variable::FolderPath => folder_path(context.document),
            Variable::ParentFolder => parent_folder(context.document),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn project_name(context: &ExpansionContext<'_>) -> String {
    if context.options.ignore_single_project && context.solution.has_single_project() {
        return String::new();
    }

    let Some(project) = context.document.project() else {
        return String::new();
    };

    if context.options.ignore_builtin_projects && project.is_builtin() {
        return String::new();
    }

    project.name()
}

fn parent_dir(path: &str) -> String {
    let parts = split_path(path);
    if parts.len() < 2 {
        return String::new();
    }
    parts[parts.len() - 2].to_string()
}

fn filename(path: &str) -> String {
    split_path(path)
        .last()
        .map(|part| part.to_string())
        .unwrap_or_default()
}

fn folder_path(document: &dyn Document) -> String {
    collect_folders(document).join("/")
}

fn parent_folder(document: &dyn Document) -> String {
    collect_folders(document).pop().unwrap_or_default()
}

/// Splits on both `/` and `\`, drops empty segments and a leading drive
/// letter such as `C:`.
pub fn split_path(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path
        .split(|c: char| c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .collect();

    if parts.first().is_some_and(|first| is_drive(first)) {
        parts.remove(0);
    }

    parts
}

fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Names of the folders above the document's tree item, root first.
///
/// Built-in projects expose their synthetic container as a first folder
/// level; that segment is dropped.
fn collect_folders(document: &dyn Document) -> Vec<String> {
    let Some(item) = document.tree_item() else {
        return Vec::new();
    };

    let mut folders = Vec::new();
    let mut current = item.parent();
    while let Some(node) = current {
        if node.is_folder() {
            folders.push(node.name());
        }
        current = node.parent();
    }
    folders.reverse();

    let builtin = document
        .project()
        .map(|project| project.is_builtin())
        .unwrap_or(false);
    if builtin && !folders.is_empty() {
        folders.remove(0);
    }

    folders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestDocument, TestProject, TestSolution, TestTreeItem};
    use std::sync::Arc;

    fn expand(variable: Variable, document: &TestDocument) -> String {
        expand_with(variable, document, &OptionValues::default(), false)
    }

    fn expand_with(
        variable: Variable,
        document: &TestDocument,
        options: &OptionValues,
        single_project: bool,
    ) -> String {
        let solution = TestSolution::new(single_project);
        variable.expand(&ExpansionContext::new(document, options, &solution))
    }

    #[test]
    fn names_round_trip() {
        for variable in Variable::ALL {
            assert_eq!(Variable::from_name(variable.name()), Some(variable));
        }
        assert_eq!(Variable::from_name("filename"), None);
        assert_eq!(Variable::from_name("FilterPath"), None);
    }

    #[test]
    fn project_name_honours_single_project_option() {
        let project = TestProject::new("project", false);
        let document = TestDocument::at("path").with_project(project);
        let orphan = TestDocument::at("path");

        let mut options = OptionValues::default();
        options.ignore_single_project = true;
        assert_eq!(expand_with(Variable::ProjectName, &document, &options, true), "");
        assert_eq!(expand_with(Variable::ProjectName, &orphan, &options, true), "");
        assert_eq!(
            expand_with(Variable::ProjectName, &document, &options, false),
            "project"
        );
        assert_eq!(expand_with(Variable::ProjectName, &orphan, &options, false), "");

        options.ignore_single_project = false;
        assert_eq!(
            expand_with(Variable::ProjectName, &document, &options, true),
            "project"
        );
        assert_eq!(expand_with(Variable::ProjectName, &orphan, &options, true), "");
    }

    #[test]
    fn project_name_honours_builtin_option() {
        let misc = TestProject::new("Miscellaneous Files", true);
        let document = TestDocument::at("path").with_project(misc);

        let mut options = OptionValues::default();
        options.ignore_single_project = false;
        assert_eq!(expand_with(Variable::ProjectName, &document, &options, false), "");

        options.ignore_builtin_projects = false;
        assert_eq!(
            expand_with(Variable::ProjectName, &document, &options, false),
            "Miscellaneous Files"
        );
    }

    #[test]
    fn parent_dir_cases() {
        let cases = [
            ("", ""),
            ("C:\\f.cpp", ""),
            ("C:\\a\\f.cpp", "a"),
            ("C:\\a\\b\\f.cpp", "b"),
            ("f.cpp", ""),
            ("a\\f.cpp", "a"),
            ("a\\b\\f.cpp", "b"),
            ("/f.cpp", ""),
            ("/a/f.cpp", "a"),
            ("/a/b/f.cpp", "b"),
            ("a/f.cpp", "a"),
            ("a/b/f.cpp", "b"),
        ];
        for (path, expected) in cases {
            assert_eq!(
                expand(Variable::ParentDir, &TestDocument::at(path)),
                expected,
                "ParentDir of {path:?}"
            );
        }
    }

    #[test]
    fn filename_cases() {
        let cases = [
            ("", ""),
            ("C:\\f.cpp", "f.cpp"),
            ("C:\\a\\b\\f.cpp", "f.cpp"),
            ("C:\\", ""),
            ("C:\\a\\", "a"),
            ("C:\\a\\b\\", "b"),
            ("a\\b\\", "b"),
            ("/a/b/f.cpp", "f.cpp"),
            ("/a/", "a"),
            ("a/b/", "b"),
        ];
        for (path, expected) in cases {
            assert_eq!(
                expand(Variable::Filename, &TestDocument::at(path)),
                expected,
                "Filename of {path:?}"
            );
        }
    }

    #[test]
    fn full_path_is_unchanged() {
        for path in ["", "C:\\", "C:\\a\\", "C:\\a\\f.cpp"] {
            assert_eq!(expand(Variable::FullPath, &TestDocument::at(path)), path);
        }
    }

    #[test]
    fn folder_walk() {
        let root = TestTreeItem::root("root");
        let root_f = TestTreeItem::file("f", &root);
        let root_a = TestTreeItem::folder("a", &root);
        let root_a_f = TestTreeItem::file("f", &root_a);
        let root_a_b = TestTreeItem::folder("b", &root_a);
        let root_a_b_f = TestTreeItem::file("f", &root_a_b);

        let check = |item: Option<&Arc<TestTreeItem>>, path: &str, parent: &str| {
            let mut document = TestDocument::at("f");
            if let Some(item) = item {
                document = document.with_tree_item(Arc::clone(item));
            }
            assert_eq!(expand(Variable::FolderPath, &document), path);
            assert_eq!(expand(Variable::ParentFolder, &document), parent);
        };

        check(None, "", "");
        check(Some(&root), "", "");
        check(Some(&root_f), "", "");
        check(Some(&root_a_f), "a", "a");
        check(Some(&root_a_b_f), "a/b", "b");
    }

    #[test]
    fn builtin_project_drops_synthetic_folder() {
        let root = TestTreeItem::root("Miscellaneous Files");
        let external = TestTreeItem::folder("External Dependencies", &root);
        let sub = TestTreeItem::folder("sub", &external);
        let file = TestTreeItem::file("f.h", &sub);
        let document = TestDocument::at("f.h")
            .with_project(TestProject::new("Miscellaneous Files", true))
            .with_tree_item(file);

        assert_eq!(expand(Variable::FolderPath, &document), "sub");
        assert_eq!(expand(Variable::ParentFolder, &document), "sub");
    }

    #[test]
    fn split_path_only_drops_leading_drive() {
        assert_eq!(split_path("C:\\a\\D:\\f"), vec!["a", "D:", "f"]);
        assert_eq!(split_path("CC:\\a"), vec!["CC:", "a"]);
    }
}
