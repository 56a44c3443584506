//! Dependency graph between schema actions.
//!
//! Nodes are the actions of a [`SchemaDiff`], identified by their position in
//! it. An edge `a -> b` means `a` must be applied before `b`.
//!
//! Most edges come from plain containment (a table before its columns, a
//! column before the indexes on it) and from name reuse (a dropped index
//! before the index that takes its name). Two kinds are different:
//!
//! ```text
//! AddForeignKey(book -> author), with both tables new
//!   => CreateTable(author) -> CreateTable(book)    induced by the foreign key
//!
//! AddForeignKey(book -> author), author gaining keys of its own
//!   => AddForeignKey(author -> ...) -> AddForeignKey(book -> author)
//!                                                  induced by the foreign key
//! ```
//!
//! A parent is settled before its children point at it. Both edges belong to
//! the child's foreign key and disappear when it is deferred, which is the
//! only way the planner can break a cycle.

use crate::diff::SchemaDiff;
use crate::error::{Error, Result};
use remodel_schema::{SchemaAction, SchemaModel};
use std::collections::{HashMap, HashSet};

/// A "before" relation between two actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// The `AddForeignKey` node this edge exists for, if it is induced.
    pub induced_by: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    actions: Vec<SchemaAction>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    induced: HashMap<usize, Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph for `diff`, checking every action against the model
    /// it refers to: drops and renames against `old`, creations against
    /// `new`.
    pub fn build(diff: SchemaDiff, old: &SchemaModel, new: &SchemaModel) -> Result<Self> {
        let actions = diff.actions;

        for action in &actions {
            if let Some(reason) = missing_structure(action, old, new) {
                return Err(Error::InvalidModel {
                    action: action.to_string(),
                    reason,
                });
            }
        }

        let edges = EdgeBuilder::new(&actions).build();
        let graph = Self::from_parts(actions, edges);

        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edges.len(),
            induced = graph.induced.values().map(Vec::len).sum::<usize>(),
            "dependency graph built"
        );
        Ok(graph)
    }

    fn from_parts(actions: Vec<SchemaAction>, edges: Vec<Edge>) -> Self {
        let mut outgoing = vec![Vec::new(); actions.len()];
        let mut incoming = vec![Vec::new(); actions.len()];
        let mut induced: HashMap<usize, Vec<usize>> = HashMap::new();

        for (id, edge) in edges.iter().enumerate() {
            outgoing[edge.from].push(id);
            incoming[edge.to].push(id);
            if let Some(fk) = edge.induced_by {
                induced.entry(fk).or_default().push(id);
            }
        }

        Self {
            actions,
            edges,
            outgoing,
            incoming,
            induced,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn action(&self, node: usize) -> &SchemaAction {
        &self.actions[node]
    }

    pub fn actions(&self) -> &[SchemaAction] {
        &self.actions
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: usize) -> &Edge {
        &self.edges[id]
    }

    /// Ids of the edges leaving `node`.
    pub fn outgoing(&self, node: usize) -> &[usize] {
        &self.outgoing[node]
    }

    /// Ids of the edges entering `node`.
    pub fn incoming(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    /// Ids of the edges induced by the foreign key at `node`.
    pub fn induced_by(&self, node: usize) -> &[usize] {
        self.induced.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes that must come before `node`.
    pub fn predecessors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.incoming[node].iter().map(|&e| self.edges[e].from)
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.outgoing[from]
            .iter()
            .any(|&e| self.edges[e].to == to)
    }
}

/// Why `action` does not fit the model it refers to, if it does not.
fn missing_structure(
    action: &SchemaAction,
    old: &SchemaModel,
    new: &SchemaModel,
) -> Option<String> {
    let (model, which) = if action.is_creation() {
        (new, "new")
    } else {
        (old, "old")
    };

    let name = action.table();
    let Some(table) = model.get_table(name) else {
        return Some(format!("table '{}' does not exist in the {} model", name, which));
    };

    let (found, what) = match action {
        SchemaAction::CreateTable(_) | SchemaAction::DropTable(_) => return None,
        SchemaAction::AddColumn { column, .. } | SchemaAction::DropColumn { column, .. } => (
            table.get_column(&column.name) == Some(column),
            format!("column '{}.{}'", name, column.name),
        ),
        SchemaAction::RenameColumn {
            column, from, to, ..
        } => {
            // A step through a temporary name matches only one side
            let after = new.get_table(name).and_then(|t| t.get_column(column));
            let found = match (table.get_column(column), after) {
                (Some(b), Some(a)) => b.storage_name() == from || a.storage_name() == to,
                _ => false,
            };
            if found {
                return None;
            }
            return Some(format!(
                "column '{}.{}' is neither stored as '{}' before nor as '{}' after",
                name, column, from, to
            ));
        }
        SchemaAction::CreateIndex { index, .. } | SchemaAction::DropIndex { index, .. } => (
            table.indices.contains(index),
            format!("index '{}'", index.name),
        ),
        SchemaAction::AddForeignKey { foreign_key, .. }
        | SchemaAction::DropForeignKey { foreign_key, .. } => (
            table.foreign_keys.contains(foreign_key),
            format!("foreign key '{}'", foreign_key.constraint_name(name)),
        ),
        SchemaAction::CreateFullTextIndex { index, .. }
        | SchemaAction::DropFullTextIndex { index, .. } => (
            table.full_text.as_ref() == Some(index),
            format!("full-text index '{}'", index.index_name(name)),
        ),
    };

    (!found).then(|| format!("{} does not exist in the {} model", what, which))
}

/// Node lookups by the structure each action creates, removes or frees.
struct EdgeBuilder<'a> {
    actions: &'a [SchemaAction],
    create_table: HashMap<&'a str, usize>,
    drop_table: HashMap<&'a str, usize>,
    add_column: HashMap<(&'a str, &'a str), usize>,
    drop_column: HashMap<(&'a str, &'a str), usize>,
    /// Two entries when a storage swap renames through a temporary name.
    rename_column: HashMap<(&'a str, &'a str), Vec<usize>>,
    /// (table, storage name) -> drops and renames that stop using it
    frees_storage: HashMap<(&'a str, &'a str), Vec<usize>>,
    drop_index_by_name: HashMap<&'a str, Vec<usize>>,
    drop_index_by_key: HashMap<(&'a str, &'a [String], bool), Vec<usize>>,
    /// (table, constraint name)
    drop_foreign_key: HashMap<(&'a str, String), Vec<usize>>,
    drop_full_text: HashMap<&'a str, usize>,
    /// owning table -> foreign keys being added to it
    add_foreign_key: HashMap<&'a str, Vec<usize>>,

    edges: Vec<Edge>,
    seen: HashSet<Edge>,
}

impl<'a> EdgeBuilder<'a> {
    fn new(actions: &'a [SchemaAction]) -> Self {
        let mut b = Self {
            actions,
            create_table: HashMap::new(),
            drop_table: HashMap::new(),
            add_column: HashMap::new(),
            drop_column: HashMap::new(),
            rename_column: HashMap::new(),
            frees_storage: HashMap::new(),
            drop_index_by_name: HashMap::new(),
            drop_index_by_key: HashMap::new(),
            drop_foreign_key: HashMap::new(),
            drop_full_text: HashMap::new(),
            add_foreign_key: HashMap::new(),
            edges: Vec::new(),
            seen: HashSet::new(),
        };

        for (i, action) in actions.iter().enumerate() {
            match action {
                SchemaAction::CreateTable(t) => {
                    b.create_table.insert(t.name.as_str(), i);
                }
                SchemaAction::DropTable(t) => {
                    b.drop_table.insert(t.name.as_str(), i);
                }
                SchemaAction::AddColumn { table, column } => {
                    b.add_column
                        .insert((table.as_str(), column.name.as_str()), i);
                }
                SchemaAction::DropColumn { table, column } => {
                    b.drop_column
                        .insert((table.as_str(), column.name.as_str()), i);
                    b.frees_storage
                        .entry((table.as_str(), column.storage_name()))
                        .or_default()
                        .push(i);
                }
                SchemaAction::RenameColumn {
                    table, column, from, ..
                } => {
                    b.rename_column
                        .entry((table.as_str(), column.as_str()))
                        .or_default()
                        .push(i);
                    b.frees_storage
                        .entry((table.as_str(), from.as_str()))
                        .or_default()
                        .push(i);
                }
                SchemaAction::DropIndex { table, index } => {
                    b.drop_index_by_name
                        .entry(index.name.as_str())
                        .or_default()
                        .push(i);
                    b.drop_index_by_key
                        .entry((table.as_str(), index.columns.as_slice(), index.unique))
                        .or_default()
                        .push(i);
                }
                SchemaAction::DropForeignKey { table, foreign_key } => {
                    b.drop_foreign_key
                        .entry((table.as_str(), foreign_key.constraint_name(table)))
                        .or_default()
                        .push(i);
                }
                SchemaAction::DropFullTextIndex { table, .. } => {
                    b.drop_full_text.insert(table.as_str(), i);
                }
                SchemaAction::AddForeignKey { table, .. } => {
                    b.add_foreign_key.entry(table.as_str()).or_default().push(i);
                }
                SchemaAction::CreateIndex { .. } | SchemaAction::CreateFullTextIndex { .. } => {}
            }
        }

        b
    }

    fn build(mut self) -> Vec<Edge> {
        let actions = self.actions;
        for (i, action) in actions.iter().enumerate() {
            match action {
                SchemaAction::CreateTable(t) => {
                    self.edge_from(self.drop_table.get(t.name.as_str()).copied(), i);
                }

                SchemaAction::AddColumn { table, column } => {
                    self.edge_from(self.create_table.get(table.as_str()).copied(), i);
                    self.edge_from(
                        self.drop_column.get(&(table.as_str(), column.name.as_str())).copied(),
                        i,
                    );
                    self.edges_from_storage(table, column.storage_name(), i);
                }

                SchemaAction::RenameColumn {
                    table,
                    column,
                    from,
                    to,
                } => {
                    // Steps of one column: the step into `from` comes first,
                    // and no step waits for its own column to free `to`.
                    let steps = self
                        .rename_column
                        .get(&(table.as_str(), column.as_str()))
                        .cloned()
                        .unwrap_or_default();
                    for &step in &steps {
                        if let SchemaAction::RenameColumn { to: into, .. } = &actions[step]
                            && into == from
                        {
                            self.add(step, i, None);
                        }
                    }
                    let frees = self
                        .frees_storage
                        .get(&(table.as_str(), to.as_str()))
                        .cloned()
                        .unwrap_or_default();
                    for other in frees.into_iter().filter(|f| !steps.contains(f)) {
                        self.add(other, i, None);
                    }
                }

                SchemaAction::CreateIndex { table, index } => {
                    self.edge_from(self.create_table.get(table.as_str()).copied(), i);
                    for col in &index.columns {
                        self.edges_from_column(table, col, i);
                    }
                    let same_name = self.drop_index_by_name.get(index.name.as_str()).cloned();
                    let same_key = self
                        .drop_index_by_key
                        .get(&(table.as_str(), index.columns.as_slice(), index.unique))
                        .cloned();
                    for from in same_name.into_iter().chain(same_key).flatten() {
                        self.add(from, i, None);
                    }
                }

                SchemaAction::AddForeignKey { table, foreign_key } => {
                    let parent = foreign_key.references_table.as_str();
                    let child_created = self.create_table.get(table.as_str()).copied();
                    let parent_created = self.create_table.get(parent).copied();

                    self.edge_from(child_created, i);
                    self.edge_from(parent_created, i);
                    for col in &foreign_key.columns {
                        self.edges_from_column(table, col, i);
                    }
                    for col in &foreign_key.references_columns {
                        self.edges_from_column(parent, col, i);
                    }
                    let name = (table.as_str(), foreign_key.constraint_name(table));
                    if let Some(drops) = self.drop_foreign_key.get(&name).cloned() {
                        for from in drops {
                            self.add(from, i, None);
                        }
                    }

                    if table != parent {
                        if let (Some(child), Some(parent_node)) = (child_created, parent_created) {
                            self.add(parent_node, child, Some(i));
                        }
                        if let Some(settling) = self.add_foreign_key.get(parent).cloned() {
                            for from in settling {
                                self.add(from, i, Some(i));
                            }
                        }
                    }
                }

                SchemaAction::CreateFullTextIndex { table, index } => {
                    self.edge_from(self.create_table.get(table.as_str()).copied(), i);
                    self.edges_from_column(table, &index.column, i);
                    self.edge_from(self.drop_full_text.get(table.as_str()).copied(), i);
                }

                SchemaAction::DropForeignKey { table, foreign_key } => {
                    let parent = foreign_key.references_table.as_str();
                    self.edge_to(i, self.drop_table.get(table.as_str()).copied());
                    self.edge_to(i, self.drop_table.get(parent).copied());
                    for col in &foreign_key.columns {
                        let to = self.drop_column.get(&(table.as_str(), col.as_str())).copied();
                        self.edge_to(i, to);
                    }
                    for col in &foreign_key.references_columns {
                        let to = self.drop_column.get(&(parent, col.as_str())).copied();
                        self.edge_to(i, to);
                    }
                }

                SchemaAction::DropIndex { table, index } => {
                    self.edge_to(i, self.drop_table.get(table.as_str()).copied());
                    for col in &index.columns {
                        let to = self.drop_column.get(&(table.as_str(), col.as_str())).copied();
                        self.edge_to(i, to);
                    }
                }

                SchemaAction::DropFullTextIndex { table, index } => {
                    self.edge_to(i, self.drop_table.get(table.as_str()).copied());
                    let to = self
                        .drop_column
                        .get(&(table.as_str(), index.column.as_str()))
                        .copied();
                    self.edge_to(i, to);
                }

                SchemaAction::DropTable(_) | SchemaAction::DropColumn { .. } => {}
            }
        }

        self.edges
    }

    /// Column additions and renames come before anything that uses the column.
    fn edges_from_column(&mut self, table: &str, column: &str, to: usize) {
        self.edge_from(self.add_column.get(&(table, column)).copied(), to);
        if let Some(steps) = self.rename_column.get(&(table, column)).cloned() {
            for from in steps {
                self.add(from, to, None);
            }
        }
    }

    fn edges_from_storage(&mut self, table: &str, storage_name: &str, to: usize) {
        if let Some(frees) = self.frees_storage.get(&(table, storage_name)).cloned() {
            for from in frees {
                self.add(from, to, None);
            }
        }
    }

    fn edge_from(&mut self, from: Option<usize>, to: usize) {
        if let Some(from) = from {
            self.add(from, to, None);
        }
    }

    fn edge_to(&mut self, from: usize, to: Option<usize>) {
        if let Some(to) = to {
            self.add(from, to, None);
        }
    }

    fn add(&mut self, from: usize, to: usize, induced_by: Option<usize>) {
        let edge = Edge {
            from,
            to,
            induced_by,
        };
        if from != to && self.seen.insert(edge) {
            self.edges.push(edge);
        }
    }
}
