//! Import precedence for a tree of rule modules.
//!
//! Precedence is assigned in post-order over imports: every imported module
//! ranks below the module importing it, and a later import ranks above an
//! earlier one. Included modules are part of their includer and share its
//! precedence; their own imports are visited as if the includer declared them.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTree {
    pub name: String,
    pub imports: Vec<ModuleTree>,
    pub includes: Vec<ModuleTree>,
}

impl ModuleTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn import(mut self, module: ModuleTree) -> Self {
        self.imports.push(module);
        self
    }

    pub fn include(mut self, module: ModuleTree) -> Self {
        self.includes.push(module);
        self
    }
}

/// Module names with their assigned precedence, in assignment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPrecedences {
    entries: Vec<(String, i32)>,
}

impl ImportPrecedences {
    /// Precedence of the first module with `name`.
    pub fn get(&self, name: &str) -> Option<i32> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assign precedences starting at 1; the root always gets the highest.
pub fn assign_import_precedence(root: &ModuleTree) -> ImportPrecedences {
    let mut out = ImportPrecedences::default();
    let mut counter = 0;
    visit(root, &mut counter, &mut out);
    out
}

fn visit(module: &ModuleTree, counter: &mut i32, out: &mut ImportPrecedences) {
    let mut members = Vec::new();
    collect_includes(module, &mut members);
    for member in &members {
        for import in &member.imports {
            visit(import, counter, out);
        }
    }
    *counter += 1;
    for member in members {
        out.entries.push((member.name.clone(), *counter));
    }
}

fn collect_includes<'a>(module: &'a ModuleTree, members: &mut Vec<&'a ModuleTree>) {
    members.push(module);
    for include in &module.includes {
        collect_includes(include, members);
    }
}
