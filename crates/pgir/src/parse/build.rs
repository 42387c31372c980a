//! Applying parsed statements to a [`Model`].
//!
//! Statements are applied in script order. A `CREATE TABLE` whose `LIKE`
//! source or partition parent has not been seen yet waits in a deferred
//! queue, together with every later statement that targets the waiting
//! table. Triggers always wait until every table exists.

use std::collections::HashSet;
use std::sync::Arc;

use pgir_model::{
    Aggregate, Column, CompositeAttribute, Constraint, ConstraintColumn, ConstraintKind,
    DefaultPrivilege, Domain, DomainConstraint, ForeignKeyRef, Function, GeneratedColumn, Identity,
    IdentityGeneration, Index, IndexColumn, IndexKind, Keyed, Model, Parameter, ParameterMode,
    Procedure, RlsPolicy, Schema, Sequence, SequenceOwner, Table, TableRef, Trigger, Type,
    TypeKind, View,
};
use pgir_sql::{Expr, PG_IDENT_MAX, choose_name, parse_expr, qualified_name};
use regex::Regex;

use super::ast::*;
use super::grammar::exclusion_index;
use crate::ignore::{IgnorePredicate, ObjectKind};
use crate::{Error, Result};

/// A statement waiting for tables that do not exist yet.
struct Deferred {
    statement: Statement,
    waits_on: Vec<TableRef>,
}

/// Builds a model from statements, in two passes.
pub struct Builder<'a> {
    model: Model,
    default_schema: String,
    ignore: &'a dyn IgnorePredicate,
    deferred: Vec<Deferred>,
    /// Tables whose `CREATE TABLE` sits in `deferred`
    deferred_tables: HashSet<TableRef>,
    triggers: Vec<CreateTrigger>,
    /// Built like any other table, dropped by [`Builder::finish`]
    ignored_tables: HashSet<TableRef>,
    ignored_views: HashSet<TableRef>,
    partition_name: Regex,
}

impl<'a> Builder<'a> {
    pub fn new(default_schema: &str, ignore: &'a dyn IgnorePredicate) -> Result<Self> {
        let partition_name = Regex::new(r"^(.+)_\d{4}(_?\d{2})?$")
            .map_err(|e| Error::Config(format!("partition name pattern: {e}")))?;
        let model = Model::new();
        model.get_or_create_schema(default_schema);
        Ok(Self {
            model,
            default_schema: default_schema.to_string(),
            ignore,
            deferred: Vec::new(),
            deferred_tables: HashSet::new(),
            triggers: Vec::new(),
            ignored_tables: HashSet::new(),
            ignored_views: HashSet::new(),
            partition_name,
        })
    }

    /// First pass: apply `statement` now, or queue it.
    pub fn apply(&mut self, statement: Statement) -> Result<()> {
        let statement = match statement {
            Statement::CreateTrigger(trigger) => {
                tracing::debug!(trigger = %trigger.name, "deferred trigger");
                self.triggers.push(trigger);
                return Ok(());
            }
            other => other,
        };
        let waits_on = self.waits_on(&statement);
        if waits_on.is_empty() {
            return self.execute(statement);
        }
        if let Statement::CreateTable(table) = &statement {
            let target = self.table_ref(&table.name);
            tracing::debug!(table = %target, waits_on = ?waits_on, "deferred table");
            self.deferred_tables.insert(target);
        }
        self.deferred.push(Deferred {
            statement,
            waits_on,
        });
        Ok(())
    }

    /// Between the passes: run queued statements as their tables appear.
    pub fn resolve_deferred(&mut self) -> Result<()> {
        loop {
            let ready = self
                .deferred
                .iter()
                .position(|d| d.waits_on.iter().all(|t| self.table_exists(t)));
            let Some(ready) = ready else { break };
            let Deferred { statement, .. } = self.deferred.remove(ready);
            if let Statement::CreateTable(table) = &statement {
                let target = self.table_ref(&table.name);
                self.deferred_tables.remove(&target);
                tracing::debug!(table = %target, "resolved deferred table");
            }
            self.execute(statement)?;
        }
        match self.deferred.first() {
            None => Ok(()),
            Some(stuck) => {
                let missing = stuck
                    .waits_on
                    .iter()
                    .find(|t| !self.table_exists(t))
                    .map(ToString::to_string)
                    .unwrap_or_default();
                Err(Error::unresolved("table", missing))
            }
        }
    }

    /// Second pass: attach the queued triggers.
    pub fn apply_triggers(&mut self) -> Result<()> {
        for trigger in std::mem::take(&mut self.triggers) {
            self.create_trigger(trigger)?;
        }
        Ok(())
    }

    /// Build the final model. Ignored tables are left out, except for a
    /// stand-in carrying their triggers, and partition key order is settled.
    pub fn finish(self) -> Model {
        let model = Model::new();
        for source in self.model.schemas() {
            let schema = model.get_or_create_schema(&source.name);
            for table in source.tables() {
                if !self
                    .ignored_tables
                    .contains(&TableRef::new(&table.schema, &table.name))
                {
                    schema.put_table(table);
                } else if !table.triggers.is_empty() {
                    let mut stub = Table::external(&table.schema, &table.name);
                    stub.triggers = table.triggers;
                    schema.put_table(stub);
                }
            }
            source.views().into_iter().for_each(|v| schema.put_view(v));
            source.functions().into_iter().for_each(|f| schema.put_function(f));
            source.procedures().into_iter().for_each(|p| schema.put_procedure(p));
            source.aggregates().into_iter().for_each(|a| schema.put_aggregate(a));
            source.sequences().into_iter().for_each(|s| schema.put_sequence(s));
            source.types().into_iter().for_each(|t| schema.put_type(t));
            for privilege in source.default_privileges() {
                schema.add_default_privilege(privilege);
            }
            schema.reorder_partition_keys();
        }
        model
    }

    fn table_ref(&self, name: &QualifiedName) -> TableRef {
        TableRef::new(name.schema_or(&self.default_schema), &name.name)
    }

    fn schema_for(&self, name: &QualifiedName) -> Arc<Schema> {
        self.model
            .get_or_create_schema(name.schema_or(&self.default_schema))
    }

    fn table_exists(&self, table: &TableRef) -> bool {
        self.model
            .schema(&table.schema)
            .is_some_and(|s| s.has_table(&table.name))
    }

    fn find_table(&self, table: &TableRef) -> Option<Table> {
        self.model.schema(&table.schema)?.table(&table.name)
    }

    /// Tables `statement` has to wait for.
    fn waits_on(&self, statement: &Statement) -> Vec<TableRef> {
        let mut waits = Vec::new();
        let need = |name: &QualifiedName, waits: &mut Vec<TableRef>| {
            let table = self.table_ref(name);
            if !self.table_exists(&table) && !waits.contains(&table) {
                waits.push(table);
            }
        };
        let pending = |name: &QualifiedName, waits: &mut Vec<TableRef>| {
            let table = self.table_ref(name);
            if self.deferred_tables.contains(&table) && !waits.contains(&table) {
                waits.push(table);
            }
        };
        match statement {
            Statement::CreateTable(table) => {
                for element in &table.elements {
                    match element {
                        TableElement::Like(like) => need(&like.source, &mut waits),
                        TableElement::Constraint(constraint) => {
                            if let TableConstraintKind::ForeignKey { target, .. } = &constraint.kind
                            {
                                pending(&target.table, &mut waits);
                            }
                        }
                        TableElement::Column(column) => {
                            for constraint in &column.constraints {
                                if let ColumnConstraintKind::References(target) = &constraint.kind {
                                    pending(&target.table, &mut waits);
                                }
                            }
                        }
                    }
                }
                if let Some(of) = &table.partition_of {
                    need(&of.parent, &mut waits);
                }
            }
            Statement::CreateIndex(index) => pending(&index.table, &mut waits),
            Statement::CreatePolicy(policy) => pending(&policy.table, &mut waits),
            Statement::AlterTable(alter) => {
                pending(&alter.name, &mut waits);
                for action in &alter.actions {
                    match action {
                        AlterAction::AttachPartition { child, .. } => pending(child, &mut waits),
                        AlterAction::AddConstraint(TableConstraint {
                            kind: TableConstraintKind::ForeignKey { target, .. },
                            ..
                        }) => pending(&target.table, &mut waits),
                        _ => {}
                    }
                }
            }
            Statement::Comment(comment) => match &comment.target {
                CommentTarget::Table(table)
                | CommentTarget::Column { table, .. }
                | CommentTarget::Constraint { table, .. } => pending(table, &mut waits),
                _ => {}
            },
            _ => {}
        }
        waits
    }

    fn execute(&mut self, statement: Statement) -> Result<()> {
        match statement {
            Statement::CreateSchema(name) => {
                self.model.get_or_create_schema(&name);
                Ok(())
            }
            Statement::CreateTable(table) => self.create_table(table),
            Statement::CreateIndex(index) => self.create_index(index),
            Statement::CreateView(view) => {
                self.create_view(view);
                Ok(())
            }
            Statement::CreateRoutine(routine) => {
                self.create_routine(routine);
                Ok(())
            }
            Statement::CreateAggregate(aggregate) => {
                self.create_aggregate(aggregate);
                Ok(())
            }
            Statement::CreateSequence(sequence) => {
                self.create_sequence(sequence);
                Ok(())
            }
            Statement::AlterSequence(sequence) => self.alter_sequence(sequence),
            Statement::CreateType(ty) => {
                self.create_type(ty);
                Ok(())
            }
            Statement::CreateDomain(domain) => {
                self.create_domain(domain);
                Ok(())
            }
            Statement::CreateTrigger(trigger) => self.create_trigger(trigger),
            Statement::CreatePolicy(policy) => self.create_policy(policy),
            Statement::AlterTable(alter) => self.alter_table(alter),
            Statement::Comment(comment) => {
                self.comment(comment);
                Ok(())
            }
            Statement::DefaultPrivileges(grant) => {
                self.default_privileges(grant);
                Ok(())
            }
            Statement::Other(head) => {
                tracing::trace!(statement = %head, "no schema effect");
                Ok(())
            }
        }
    }

    fn create_table(&mut self, create: CreateTable) -> Result<()> {
        let target = self.table_ref(&create.name);
        let schema = self.schema_for(&create.name);
        let mut table = Table::new(&target.schema, &target.name);
        let mut names = Names::of_schema(&schema);
        names.claim(&table.name);
        for element in &create.elements {
            if let TableElement::Constraint(TableConstraint {
                name: Some(name), ..
            }) = element
            {
                names.claim(name);
            }
        }

        let parent = match &create.partition_of {
            Some(of) => {
                let parent_ref = self.table_ref(&of.parent);
                let parent = self
                    .find_table(&parent_ref)
                    .ok_or_else(|| Error::unresolved("table", parent_ref.to_string()))?;
                for column in &parent.columns {
                    table.add_column(Column {
                        identity: None,
                        comment: None,
                        ..column.clone()
                    });
                }
                Some(parent)
            }
            None => None,
        };

        let mut pending = Vec::new();
        let mut likes = Vec::new();
        for element in create.elements {
            match element {
                TableElement::Column(def) if parent.is_some() && def.data_type.is_empty() => {
                    column_options(&mut table, def, &mut pending)?;
                }
                TableElement::Column(def) => {
                    self.add_column(&schema, &mut table, def, &mut pending, &mut names);
                }
                TableElement::Constraint(constraint) => pending.push(constraint),
                TableElement::Like(like) => {
                    let source_ref = self.table_ref(&like.source);
                    let source = self
                        .find_table(&source_ref)
                        .ok_or_else(|| Error::unresolved("table", source_ref.to_string()))?;
                    copy_like_columns(&mut table, &source, like.options);
                    likes.push((source, like.options));
                }
            }
        }

        self.add_constraints(&mut table, pending, &mut names)?;
        for (source, options) in &likes {
            copy_like_objects(&mut table, source, *options, &mut names);
        }

        if let Some((strategy, key)) = create.partition_by {
            table.partition_strategy = Some(strategy);
            table.partition_key = Some(key);
        }
        if let (Some(of), Some(parent)) = (create.partition_of, parent) {
            inherit_keys(&mut table, &parent, &mut names);
            table.partition_of = Some(TableRef::new(&parent.schema, &parent.name));
            table.partition_bound = Some(of.bound);
        }

        if self.ignore.is_ignored(ObjectKind::Table, &table.name) {
            tracing::debug!(table = %target, "ignored table");
            self.ignored_tables.insert(target);
        }
        schema.put_table(table);
        Ok(())
    }

    /// Add a typed column; inline constraints land in `pending`.
    fn add_column(
        &self,
        schema: &Schema,
        table: &mut Table,
        def: ColumnDef,
        pending: &mut Vec<TableConstraint>,
        names: &mut Names,
    ) {
        let serial = serial_base(&def.data_type);
        let mut column = Column::new(&def.name, serial.unwrap_or(&def.data_type));
        column.collation = def.collation;

        if let Some(base) = serial {
            column.nullable = false;
            column.default = Some(self.serial_default(schema, table, &def.name, base, names));
        }

        for constraint in def.constraints {
            let ColumnConstraint {
                name,
                kind,
                deferrable,
                initially_deferred,
            } = constraint;
            let to_table = |kind| TableConstraint {
                name: name.clone(),
                kind,
                deferrable,
                initially_deferred,
                not_valid: false,
            };
            match kind {
                ColumnConstraintKind::NotNull => column.nullable = false,
                ColumnConstraintKind::Null => column.nullable = true,
                ColumnConstraintKind::Default(expr) => column.default = Some(expr),
                ColumnConstraintKind::PrimaryKey => {
                    pending.push(to_table(TableConstraintKind::PrimaryKey {
                        columns: vec![def.name.clone()],
                        include: Vec::new(),
                    }));
                }
                ColumnConstraintKind::Unique { nulls_not_distinct } => {
                    pending.push(to_table(TableConstraintKind::Unique {
                        columns: vec![def.name.clone()],
                        include: Vec::new(),
                        nulls_not_distinct,
                    }));
                }
                ColumnConstraintKind::Check { expr, .. } => {
                    pending.push(to_table(TableConstraintKind::Check { expr }));
                }
                ColumnConstraintKind::References(target) => {
                    pending.push(to_table(TableConstraintKind::ForeignKey {
                        columns: vec![def.name.clone()],
                        target,
                    }));
                }
                ColumnConstraintKind::Identity {
                    generation,
                    options,
                } => {
                    column.identity = Some(identity(generation, &options, &column.data_type));
                    column.nullable = false;
                }
                ColumnConstraintKind::Generated { expr, stored } => {
                    column.generated = Some(GeneratedColumn {
                        expression: expr,
                        stored,
                    });
                    column.nullable = false;
                }
            }
        }
        table.add_column(column);
    }

    /// `nextval(...)` default of a serial column, creating its sequence.
    ///
    /// Tables named like a dated partition (`events_2024`, `events_2024_01`)
    /// of an existing table reuse that table's sequence instead.
    fn serial_default(
        &self,
        schema: &Schema,
        table: &Table,
        column: &str,
        base: &str,
        names: &mut Names,
    ) -> String {
        let parent = self
            .partition_name
            .captures(&table.name)
            .and_then(|c| c.get(1))
            .and_then(|m| schema.table(m.as_str()));
        if let Some(parent) = parent {
            tracing::warn!(
                table = %table.name,
                parent = %parent.name,
                column,
                "table name looks like a partition; using the parent's sequence"
            );
            let inherited = parent.column(column).and_then(|c| c.default.clone());
            return inherited.unwrap_or_else(|| {
                nextval(&schema.name, &pgir_sql::sequence_name(&parent.name, column))
            });
        }

        let name = names.choose(&table.name, Some(column), "seq");
        if self.ignore.is_ignored(ObjectKind::Sequence, &name) {
            tracing::debug!(sequence = %name, "ignored sequence");
        } else {
            let mut sequence = Sequence::new(&schema.name, &name);
            sequence.data_type = Some(base.to_string());
            sequence.owned_by = Some(SequenceOwner {
                table: table.name.clone(),
                column: column.to_string(),
            });
            schema.put_sequence(sequence);
        }
        nextval(&schema.name, &name)
    }

    /// Turn pending table constraints into model constraints, naming the
    /// unnamed ones in the order the server does: checks, then index-backed
    /// constraints, then foreign keys.
    fn add_constraints(
        &self,
        table: &mut Table,
        mut pending: Vec<TableConstraint>,
        names: &mut Names,
    ) -> Result<()> {
        for constraint in &pending {
            if let Some(name) = &constraint.name {
                names.claim(name);
            }
        }
        pending.sort_by_key(|c| match c.kind {
            TableConstraintKind::Check { .. } => 0,
            TableConstraintKind::PrimaryKey { .. } => 1,
            TableConstraintKind::Unique { .. } | TableConstraintKind::Exclude(_) => 2,
            TableConstraintKind::ForeignKey { .. } => 3,
        });
        for constraint in pending {
            self.add_constraint(table, constraint, names)?;
        }
        Ok(())
    }

    fn add_constraint(
        &self,
        table: &mut Table,
        constraint: TableConstraint,
        names: &mut Names,
    ) -> Result<()> {
        let TableConstraint {
            name,
            kind,
            deferrable,
            initially_deferred,
            not_valid,
        } = constraint;
        let (schema, table_name) = (table.schema.clone(), table.name.clone());
        let new = |name: &str, kind| {
            let mut c = Constraint::new(&schema, &table_name, name, kind);
            c.deferrable = deferrable;
            c.initially_deferred = initially_deferred;
            c.valid = !not_valid;
            c
        };

        let (constraint, index) = match kind {
            TableConstraintKind::PrimaryKey { columns, include } => {
                let name = name.unwrap_or_else(|| names.choose(&table.name, None, "pkey"));
                for column in &columns {
                    if let Some(column) = table.column_mut(column) {
                        column.nullable = false;
                    }
                }
                let mut constraint = new(&name, ConstraintKind::PrimaryKey);
                constraint.columns = ConstraintColumn::numbered(&columns);
                let mut index = Index::new(&table.schema, &table.name, &name, IndexKind::Primary);
                index.columns = columns.iter().map(IndexColumn::new).collect();
                index.include = include;
                (constraint, Some(index))
            }
            TableConstraintKind::Unique {
                columns,
                include,
                nulls_not_distinct,
            } => {
                let name = name.unwrap_or_else(|| {
                    let labels: Vec<String> = columns.iter().chain(&include).cloned().collect();
                    names.choose(&table.name, joined(&labels).as_deref(), "key")
                });
                let mut constraint = new(&name, ConstraintKind::Unique);
                constraint.columns = ConstraintColumn::numbered(&columns);
                let mut index = Index::new(&table.schema, &table.name, &name, IndexKind::Unique);
                index.columns = columns.iter().map(IndexColumn::new).collect();
                index.include = include;
                index.nulls_not_distinct = nulls_not_distinct;
                (constraint, Some(index))
            }
            TableConstraintKind::Check { expr } => {
                let name = name.unwrap_or_else(|| {
                    let column = match parse_expr(&expr).map(|e| e.column_names()) {
                        Ok(columns) if columns.len() == 1 => columns.into_iter().next(),
                        _ => None,
                    };
                    names.choose(&table.name, column.as_deref(), "check")
                });
                let mut constraint = new(&name, ConstraintKind::Check);
                constraint.check_clause = Some(format!("CHECK ({expr})"));
                (constraint, None)
            }
            TableConstraintKind::ForeignKey { columns, target } => {
                let target_ref = self.table_ref(&target.table);
                let referenced = if target.columns.is_empty() {
                    let is_self = target_ref.schema == table.schema && target_ref.name == table.name;
                    let pk = if is_self {
                        table.primary_key().map(Constraint::column_names)
                    } else {
                        self.find_table(&target_ref)
                            .and_then(|t| t.primary_key().map(Constraint::column_names))
                    };
                    pk.ok_or_else(|| Error::unresolved("primary key", target_ref.to_string()))?
                } else {
                    target.columns
                };
                let name = name.unwrap_or_else(|| {
                    names.choose(&table.name, joined(&columns).as_deref(), "fkey")
                });
                let mut constraint = new(&name, ConstraintKind::ForeignKey);
                constraint.columns = ConstraintColumn::numbered(&columns);
                constraint.foreign_key = Some(ForeignKeyRef {
                    schema: target_ref.schema,
                    table: target_ref.name,
                    columns: ConstraintColumn::numbered(&referenced),
                    on_delete: target.on_delete,
                    on_update: target.on_update,
                    match_type: target.match_type,
                });
                (constraint, None)
            }
            TableConstraintKind::Exclude(text) => {
                let spec = exclusion_index(&text)?;
                let name = name.unwrap_or_else(|| {
                    let labels = element_labels(&spec.elements, &spec.include);
                    names.choose(&table.name, joined(&labels).as_deref(), "excl")
                });
                let mut constraint = new(&name, ConstraintKind::Exclusion);
                constraint.exclusion = Some(exclusion_text(&text, spec.method.is_none()));
                let index = index_from_create(&table.schema, &table.name, &name, &spec);
                (constraint, Some(index))
            }
        };

        if let Some(index) = index {
            names.claim(&index.name);
            table.indexes.insert(index.name.clone(), index);
        }
        names.claim(&constraint.name);
        table.constraints.insert(constraint.name.clone(), constraint);
        Ok(())
    }

    fn create_index(&mut self, create: CreateIndex) -> Result<()> {
        let target = self.table_ref(&create.table);
        let schema = self.schema_for(&create.table);

        if let Some(table) = schema.table(&target.name) {
            let mut names = Names::of_schema(&schema);
            let name = match &create.name {
                Some(name) => name.clone(),
                None => {
                    let labels = element_labels(&create.elements, &create.include);
                    names.choose(&table.name, joined(&labels).as_deref(), "idx")
                }
            };
            let index = index_from_create(&target.schema, &target.name, &name, &create);
            schema.update_table(&target.name, |t| {
                t.indexes.insert(name, index);
            });
            return Ok(());
        }
        if let Some(view) = schema.view(&target.name).filter(|v| v.materialized) {
            let mut names = Names::of_schema(&schema);
            let name = match &create.name {
                Some(name) => name.clone(),
                None => {
                    let labels = element_labels(&create.elements, &create.include);
                    names.choose(&view.name, joined(&labels).as_deref(), "idx")
                }
            };
            let index = index_from_create(&target.schema, &target.name, &name, &create);
            schema.update_view(&target.name, |v| {
                v.indexes.insert(name, index);
            });
            return Ok(());
        }
        if self.ignored_views.contains(&target) {
            return Ok(());
        }
        Err(Error::unresolved("table", target.to_string()))
    }

    fn create_view(&mut self, create: CreateView) {
        let target = self.table_ref(&create.name);
        if self.ignore.is_ignored(ObjectKind::View, &target.name) {
            tracing::debug!(view = %target, "ignored view");
            self.ignored_views.insert(target);
            return;
        }
        let schema = self.schema_for(&create.name);
        let mut view = View::new(&target.schema, &target.name, create.query);
        view.materialized = create.materialized;
        schema.put_view(view);
    }

    fn create_routine(&self, create: CreateRoutine) {
        let kind = if create.procedure {
            ObjectKind::Procedure
        } else {
            ObjectKind::Function
        };
        if self.ignore.is_ignored(kind, &create.name.name) {
            tracing::debug!(routine = %create.name, "ignored routine");
            return;
        }
        let schema = self.schema_for(&create.name);
        match routine_from_create(&schema.name, create) {
            Routine::Function(function) => schema.put_function(function),
            Routine::Procedure(procedure) => schema.put_procedure(procedure),
        }
    }

    fn create_aggregate(&self, create: CreateAggregate) {
        if self.ignore.is_ignored(ObjectKind::Function, &create.name.name) {
            tracing::debug!(aggregate = %create.name, "ignored aggregate");
            return;
        }
        let schema = self.schema_for(&create.name);
        let mut aggregate = Aggregate::new(&schema.name, &create.name.name);
        aggregate.arguments = create.arguments;
        aggregate.state_function = create.state_function;
        aggregate.state_type = create.state_type;
        aggregate.final_function = create.final_function;
        aggregate.combine_function = create.combine_function;
        aggregate.initial_condition = create.initial_condition;
        aggregate.parallel = create.parallel;
        schema.put_aggregate(aggregate);
    }

    fn create_sequence(&self, create: SequenceDef) {
        if self.ignore.is_ignored(ObjectKind::Sequence, &create.name.name) {
            tracing::debug!(sequence = %create.name, "ignored sequence");
            return;
        }
        let schema = self.schema_for(&create.name);
        let mut sequence = Sequence::new(&schema.name, &create.name.name);
        let options = create.options;
        sequence.data_type = Some(options.data_type.unwrap_or_else(|| "bigint".to_string()));
        sequence.increment = options.increment.unwrap_or(1);
        let (min, max) = bounds(
            sequence.increment,
            options.min,
            options.max,
            sequence.data_type.as_deref(),
        );
        sequence.min = min;
        sequence.max = max;
        sequence.start = options
            .start
            .unwrap_or_else(|| implied_start(sequence.increment, min, max));
        sequence.cache = options.cache;
        sequence.cycle = options.cycle.unwrap_or(false);
        if let Some(Some((table, column))) = options.owned_by {
            sequence.owned_by = Some(SequenceOwner {
                table: table.name,
                column,
            });
        }
        schema.put_sequence(sequence);
    }

    fn alter_sequence(&self, alter: SequenceDef) -> Result<()> {
        if self.ignore.is_ignored(ObjectKind::Sequence, &alter.name.name) {
            return Ok(());
        }
        let schema = self.schema_for(&alter.name);
        let options = alter.options;
        schema
            .update_sequence(&alter.name.name, |sequence| {
                if let Some(data_type) = options.data_type {
                    sequence.data_type = Some(data_type);
                }
                if let Some(increment) = options.increment {
                    sequence.increment = increment;
                }
                if let Some(min) = options.min {
                    sequence.min = Some(min);
                }
                if let Some(max) = options.max {
                    sequence.max = Some(max);
                }
                if let Some(start) = options.start {
                    sequence.start = start;
                }
                if let Some(cache) = options.cache {
                    sequence.cache = Some(cache);
                }
                if let Some(cycle) = options.cycle {
                    sequence.cycle = cycle;
                }
                match options.owned_by {
                    Some(Some((table, column))) => {
                        sequence.owned_by = Some(SequenceOwner {
                            table: table.name,
                            column,
                        });
                    }
                    Some(None) => sequence.owned_by = None,
                    None => {}
                }
            })
            .ok_or_else(|| Error::unresolved("sequence", alter.name.to_string()))
    }

    fn create_type(&self, create: CreateType) {
        let (name, kind) = match create {
            CreateType::Enum { name, labels } => (name, TypeKind::Enum(labels)),
            CreateType::Composite { name, attributes } => (
                name,
                TypeKind::Composite(
                    attributes
                        .into_iter()
                        .map(|(name, data_type)| CompositeAttribute { name, data_type })
                        .collect(),
                ),
            ),
        };
        self.put_type(name, kind);
    }

    fn create_domain(&self, create: CreateDomain) {
        let schema = self.schema_for(&create.name);
        let mut names = Names::of_schema(&schema);
        for (name, _) in &create.checks {
            if let Some(name) = name {
                names.claim(name);
            }
        }
        let constraints = create
            .checks
            .into_iter()
            .map(|(name, expr)| DomainConstraint {
                name: name.unwrap_or_else(|| names.choose(&create.name.name, None, "check")),
                check_clause: format!("CHECK ({expr})"),
            })
            .collect();
        let domain = Domain {
            base_type: create.base_type,
            not_null: create.not_null,
            default: create.default,
            collation: create.collation,
            constraints,
        };
        self.put_type(create.name, TypeKind::Domain(domain));
    }

    fn put_type(&self, name: QualifiedName, kind: TypeKind) {
        if self.ignore.is_ignored(ObjectKind::Type, &name.name) {
            tracing::debug!(r#type = %name, "ignored type");
            return;
        }
        let schema = self.schema_for(&name);
        schema.put_type(Type {
            schema: schema.name.clone(),
            name: name.name,
            kind,
            comment: None,
        });
    }

    fn create_trigger(&self, create: CreateTrigger) -> Result<()> {
        let target = self.table_ref(&create.table);
        let schema = self.schema_for(&create.table);
        if !schema.has_table(&target.name) {
            if schema.view(&target.name).is_some() || self.ignored_views.contains(&target) {
                tracing::debug!(trigger = %create.name, view = %target, "skipped view trigger");
                return Ok(());
            }
            return Err(Error::unresolved("table", target.to_string()));
        }
        let trigger = trigger_from_create(&target, create);
        schema.update_table(&target.name, |t| {
            t.triggers.insert(trigger.name.clone(), trigger);
        });
        Ok(())
    }

    fn create_policy(&self, create: CreatePolicy) -> Result<()> {
        let target = self.table_ref(&create.table);
        let schema = self.schema_for(&create.table);
        let roles = if create.roles.is_empty() {
            vec!["public".to_string()]
        } else {
            create.roles
        };
        let policy = RlsPolicy {
            schema: target.schema.clone(),
            table: target.name.clone(),
            name: create.name,
            command: create.command,
            permissive: create.permissive,
            roles,
            using: create.using,
            with_check: create.with_check,
        };
        schema
            .update_table(&target.name, |t| {
                t.policies.insert(policy.name.clone(), policy);
            })
            .ok_or_else(|| Error::unresolved("table", target.to_string()))
    }

    fn alter_table(&self, alter: AlterTable) -> Result<()> {
        let target = self.table_ref(&alter.name);
        let schema = self.schema_for(&alter.name);
        let mut table = schema
            .table(&target.name)
            .ok_or_else(|| Error::unresolved("table", target.to_string()))?;
        let mut names = Names::of_schema(&schema);

        for action in alter.actions {
            match action {
                AlterAction::AddColumn(def) => {
                    let mut pending = Vec::new();
                    self.add_column(&schema, &mut table, def, &mut pending, &mut names);
                    self.add_constraints(&mut table, pending, &mut names)?;
                }
                AlterAction::AddConstraint(constraint) => {
                    self.add_constraints(&mut table, vec![constraint], &mut names)?;
                }
                AlterAction::SetDefault { column, default } => {
                    column_of(&mut table, &column)?.default = default;
                }
                AlterAction::SetNotNull { column, not_null } => {
                    column_of(&mut table, &column)?.nullable = !not_null;
                }
                AlterAction::AddIdentity {
                    column,
                    generation,
                    options,
                } => {
                    let column = column_of(&mut table, &column)?;
                    column.identity = Some(identity(generation, &options, &column.data_type));
                    column.nullable = false;
                }
                AlterAction::RowLevelSecurity { enabled, forced } => {
                    if let Some(enabled) = enabled {
                        table.rls_enabled = enabled;
                    }
                    if let Some(forced) = forced {
                        table.rls_forced = forced;
                    }
                }
                AlterAction::AttachPartition { child, bound } => {
                    self.attach_partition(&schema, &table, &child, bound)?;
                }
                AlterAction::Other => {}
            }
        }
        schema.put_table(table);
        Ok(())
    }

    /// Mark `child` as a partition of `parent`. Child indexes that match a
    /// parent index become part of it and leave the child.
    fn attach_partition(
        &self,
        schema: &Schema,
        parent: &Table,
        child: &QualifiedName,
        bound: String,
    ) -> Result<()> {
        let child_ref = self.table_ref(child);
        let child_schema = if child_ref.schema == schema.name {
            None
        } else {
            Some(self.schema_for(child))
        };
        let child_schema = child_schema.as_deref().unwrap_or(schema);
        child_schema
            .update_table(&child_ref.name, |t| {
                t.partition_of = Some(TableRef::new(&parent.schema, &parent.name));
                t.partition_bound = Some(bound);
                t.indexes.retain(|_, index| {
                    !parent.indexes.values().any(|p| {
                        p.method == index.method
                            && p.columns == index.columns
                            && p.predicate == index.predicate
                    })
                });
            })
            .ok_or_else(|| Error::unresolved("table", child_ref.to_string()))
    }

    fn comment(&self, comment: CommentOn) {
        let text = comment.text;
        let found = match comment.target {
            CommentTarget::Table(name) => self
                .schema_for(&name)
                .update_table(&name.name, |t| t.comment = text)
                .is_some(),
            CommentTarget::View(name) => self
                .schema_for(&name)
                .update_view(&name.name, |v| v.comment = text)
                .is_some(),
            CommentTarget::Column { table, column } => self
                .schema_for(&table)
                .update_table(&table.name, |t| {
                    t.column_mut(&column).map(|c| c.comment = text).is_some()
                })
                .unwrap_or(false),
            CommentTarget::Index(name) => self.comment_index(&name, text),
            CommentTarget::Sequence(name) => self
                .schema_for(&name)
                .update_sequence(&name.name, |s| s.comment = text)
                .is_some(),
            CommentTarget::Type(name) => self
                .schema_for(&name)
                .update_type(&name.name, |t| t.comment = text)
                .is_some(),
            CommentTarget::Constraint { name, table } => self
                .schema_for(&table)
                .update_table(&table.name, |t| {
                    t.constraints
                        .get_mut(&name)
                        .map(|c| c.comment = text)
                        .is_some()
                })
                .unwrap_or(false),
            CommentTarget::Function { name, arguments } => {
                let schema = self.schema_for(&name);
                let key = match arguments {
                    Some(args) => Some(format!("{}({})", name.name, args.join(", "))),
                    None => unique_key(
                        schema.functions().into_iter().filter(|f| f.name == name.name),
                    ),
                };
                key.and_then(|key| schema.update_function(&key, |f| f.comment = text))
                    .is_some()
            }
            CommentTarget::Procedure { name, arguments } => {
                let schema = self.schema_for(&name);
                let key = match arguments {
                    Some(args) => Some(format!("{}({})", name.name, args.join(", "))),
                    None => unique_key(
                        schema.procedures().into_iter().filter(|p| p.name == name.name),
                    ),
                };
                key.and_then(|key| schema.update_procedure(&key, |p| p.comment = text))
                    .is_some()
            }
            CommentTarget::Aggregate { name, arguments } => {
                let key = format!("{}({})", name.name, arguments.join(", "));
                self.schema_for(&name)
                    .update_aggregate(&key, |a| a.comment = text)
                    .is_some()
            }
            CommentTarget::Other => true,
        };
        if !found {
            tracing::debug!("comment target not in model");
        }
    }

    fn comment_index(&self, name: &QualifiedName, text: Option<String>) -> bool {
        let schema = self.schema_for(name);
        let on_table = schema.tables_mut(|tables| {
            tables
                .values_mut()
                .find_map(|t| t.indexes.get_mut(&name.name))
                .map(|i| i.comment = text.clone())
                .is_some()
        });
        on_table
            || schema.views_mut(|views| {
                views
                    .values_mut()
                    .find_map(|v| v.indexes.get_mut(&name.name))
                    .map(|i| i.comment = text)
                    .is_some()
            })
    }

    fn default_privileges(&self, grant: DefaultGrant) {
        if grant.schemas.is_empty() {
            tracing::debug!("skipped default privileges without IN SCHEMA");
            return;
        }
        let privileges: Vec<String> = if grant.privileges.iter().any(|p| p == "ALL") {
            grant
                .object_type
                .all_privileges()
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            grant.privileges
        };
        for schema in &grant.schemas {
            let schema = self.model.get_or_create_schema(schema);
            for grantee in &grant.grantees {
                schema.add_default_privilege(DefaultPrivilege {
                    object_type: grant.object_type,
                    grantee: grantee.clone(),
                    privileges: privileges.clone(),
                    grantable: grant.grantable,
                });
            }
        }
    }
}

/// Names already in use in a schema: relations, indexes and constraints.
struct Names(HashSet<String>);

impl Names {
    fn of_schema(schema: &Schema) -> Self {
        let mut names = HashSet::new();
        for table in schema.tables() {
            names.insert(table.name.clone());
            names.extend(table.constraints.keys().cloned());
            names.extend(table.indexes.keys().cloned());
        }
        for view in schema.views() {
            names.insert(view.name.clone());
            names.extend(view.indexes.keys().cloned());
        }
        for sequence in schema.sequences() {
            names.insert(sequence.name);
        }
        for ty in schema.types() {
            if let TypeKind::Domain(domain) = ty.kind {
                names.extend(domain.constraints.into_iter().map(|c| c.name));
            }
        }
        Self(names)
    }

    fn claim(&mut self, name: &str) {
        self.0.insert(name.to_string());
    }

    /// A free name built from the parts; it is claimed before returning.
    fn choose(&mut self, name1: &str, name2: Option<&str>, label: &str) -> String {
        let name = choose_name(name1, name2, label, |n| self.0.contains(n));
        self.claim(&name);
        name
    }
}

fn joined(labels: &[String]) -> Option<String> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.join("_"))
    }
}

/// Column labels for naming an index: column names, the function or column
/// an expression is built on, or `expr`. Repeated labels get a counter.
fn element_labels(elements: &[IndexElement], include: &[String]) -> Vec<String> {
    let raw = elements
        .iter()
        .map(|e| {
            if e.expression {
                parse_expr(&e.text)
                    .ok()
                    .and_then(|expr| figure_name(&expr).map(|(name, _)| name))
                    .unwrap_or_else(|| "expr".to_string())
            } else {
                e.text.clone()
            }
        })
        .chain(include.iter().cloned());
    dedupe_labels(raw)
}

fn dedupe_labels(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in raw {
        let mut candidate = label.clone();
        let mut pass = 1;
        while labels.contains(&candidate) {
            let suffix = pass.to_string();
            let mut keep = label.len().min(PG_IDENT_MAX - suffix.len());
            while !label.is_char_boundary(keep) {
                keep -= 1;
            }
            candidate = format!("{}{suffix}", &label[..keep]);
            pass += 1;
        }
        labels.push(candidate);
    }
    labels
}

/// The output name the server would give an expression, with how sure it is
/// (2 for columns and calls, 1 for fallbacks like casts and `CASE`).
fn figure_name(expr: &Expr) -> Option<(String, u8)> {
    match expr {
        Expr::Column(parts) => parts.last().map(|p| (p.clone(), 2)),
        Expr::Function { name, .. } => name.last().map(|n| (n.clone(), 2)),
        Expr::Cast { expr, ty } => match figure_name(expr) {
            Some(strong @ (_, 2)) => Some(strong),
            _ => {
                let base = ty.trim_end_matches("[]");
                let base = base.split('(').next().unwrap_or(base);
                base.rsplit('.').next().map(|t| (t.to_string(), 1))
            }
        },
        Expr::Collate { expr, .. } => figure_name(expr),
        Expr::Field { field, .. } => Some((field.clone(), 2)),
        Expr::Case { .. } => Some(("case".to_string(), 1)),
        Expr::Array(_) | Expr::ArraySubquery(_) => Some(("array".to_string(), 2)),
        Expr::Row { explicit: true, .. } => Some(("row".to_string(), 2)),
        Expr::Exists(_) => Some(("exists".to_string(), 2)),
        _ => None,
    }
}

/// Model index for a `CREATE INDEX` (or exclusion) definition.
pub(crate) fn index_from_create(
    schema: &str,
    table: &str,
    name: &str,
    create: &CreateIndex,
) -> Index {
    let kind = if create.unique {
        IndexKind::Unique
    } else {
        IndexKind::Regular
    };
    let mut index = Index::new(schema, table, name, kind);
    if let Some(method) = &create.method {
        index.method = method.clone();
    }
    index.columns = create
        .elements
        .iter()
        .map(|e| IndexColumn {
            name: e.text.clone(),
            expression: e.expression,
            order: e.order,
            nulls: e.nulls,
            opclass: e.opclass.clone(),
            collation: e.collation.clone(),
        })
        .collect();
    index.include = create.include.clone();
    index.predicate = create.predicate.clone();
    index.nulls_not_distinct = create.nulls_not_distinct;
    index.is_expression = index.columns.iter().any(|c| c.expression);
    index
}

/// A function or procedure.
pub(crate) enum Routine {
    Function(Function),
    Procedure(Procedure),
}

pub(crate) fn routine_from_create(schema: &str, create: CreateRoutine) -> Routine {
    let parameters: Vec<Parameter> = create
        .params
        .into_iter()
        .enumerate()
        .map(|(i, p)| Parameter {
            name: p.name,
            data_type: p.data_type,
            mode: p.mode,
            position: i as u32 + 1,
            default: p.default,
        })
        .collect();
    let language = create.language.unwrap_or_else(|| "sql".to_string());

    if create.procedure {
        let mut procedure = Procedure::new(schema, &create.name.name);
        procedure.definition = create.body;
        procedure.language = language;
        procedure.parameters = parameters;
        procedure.security_definer = create.security_definer;
        procedure.search_path = create.search_path;
        return Routine::Procedure(procedure);
    }

    let mut function = Function::new(schema, &create.name.name);
    function.return_type = create
        .returns
        .unwrap_or_else(|| implied_return_type(&parameters));
    function.definition = create.body;
    function.language = language;
    function.parameters = parameters;
    function.volatility = create.volatility;
    function.strict = create.strict;
    function.security_definer = create.security_definer;
    function.leakproof = create.leakproof;
    function.parallel = create.parallel;
    function.search_path = create.search_path;
    Routine::Function(function)
}

pub(crate) fn trigger_from_create(table: &TableRef, create: CreateTrigger) -> Trigger {
    Trigger {
        schema: table.schema.clone(),
        table: table.name.clone(),
        name: create.name,
        timing: create.timing,
        events: create.events,
        update_columns: create.update_columns,
        level: create.level,
        function: create.function.to_string(),
        arguments: create.arguments,
        condition: create.condition,
        constraint: create.constraint,
        deferrable: create.deferrable,
        initially_deferred: create.initially_deferred,
        referenced_table: create.referenced_table.map(|t| t.to_string()),
        old_table: create.old_table,
        new_table: create.new_table,
    }
}

/// `EXCLUDE ...` as the catalog prints it, which always names the method.
fn exclusion_text(text: &str, missing_method: bool) -> String {
    let text = text.trim();
    if !missing_method {
        return text.to_string();
    }
    let rest = text.get(7..).unwrap_or_default().trim_start();
    format!("EXCLUDE USING btree {rest}")
}

fn serial_base(data_type: &str) -> Option<&'static str> {
    match data_type {
        "serial" => Some("integer"),
        "bigserial" => Some("bigint"),
        "smallserial" => Some("smallint"),
        _ => None,
    }
}

fn nextval(schema: &str, sequence: &str) -> String {
    let name = qualified_name(schema, sequence).replace('\'', "''");
    format!("nextval('{name}'::regclass)")
}

/// Smallest value of a sequence type; no type means bigint.
fn implicit_min(data_type: Option<&str>) -> i64 {
    match data_type {
        Some("smallint") => i16::MIN as i64,
        Some("integer") => i32::MIN as i64,
        _ => i64::MIN,
    }
}

/// Bounds as the server fills them in. Ascending defaults stay `None`, which
/// is how normalization stores them anyway; descending ones are spelled out.
fn bounds(
    increment: i64,
    min: Option<i64>,
    max: Option<i64>,
    data_type: Option<&str>,
) -> (Option<i64>, Option<i64>) {
    if increment < 0 {
        (
            Some(min.unwrap_or_else(|| implicit_min(data_type))),
            Some(max.unwrap_or(-1)),
        )
    } else {
        (min, max)
    }
}

fn implied_start(increment: i64, min: Option<i64>, max: Option<i64>) -> i64 {
    if increment < 0 {
        max.unwrap_or(-1)
    } else {
        min.unwrap_or(1)
    }
}

fn identity(generation: IdentityGeneration, options: &SequenceOptions, column_type: &str) -> Identity {
    let mut identity = Identity::new(generation);
    identity.increment = options.increment.unwrap_or(1);
    let (min, max) = bounds(identity.increment, options.min, options.max, Some(column_type));
    identity.min = min;
    identity.max = max;
    identity.start = options
        .start
        .unwrap_or_else(|| implied_start(identity.increment, min, max));
    identity.cache = options.cache;
    identity.cycle = options.cycle.unwrap_or(false);
    identity
}

/// `void` without output parameters, the single output type, or `record`.
fn implied_return_type(parameters: &[Parameter]) -> String {
    let outputs: Vec<&Parameter> = parameters
        .iter()
        .filter(|p| matches!(p.mode, ParameterMode::Out | ParameterMode::InOut))
        .collect();
    match outputs.as_slice() {
        [] => "void".to_string(),
        [only] => only.data_type.clone(),
        _ => "record".to_string(),
    }
}

fn unique_key<T: Keyed>(mut matches: impl Iterator<Item = T>) -> Option<String> {
    let first = matches.next()?;
    match matches.next() {
        None => Some(first.key()),
        Some(_) => None,
    }
}

fn column_of<'t>(table: &'t mut Table, column: &str) -> Result<&'t mut Column> {
    let name = format!("{}.{column}", table.name);
    table
        .column_mut(column)
        .ok_or_else(|| Error::unresolved("column", name))
}

/// Options on an inherited column of a partition (`name WITH OPTIONS ...`).
fn column_options(
    table: &mut Table,
    def: ColumnDef,
    pending: &mut Vec<TableConstraint>,
) -> Result<()> {
    let column = column_of(table, &def.name)?;
    if def.collation.is_some() {
        column.collation = def.collation;
    }
    for constraint in def.constraints {
        let kind = match constraint.kind {
            ColumnConstraintKind::NotNull => {
                column.nullable = false;
                continue;
            }
            ColumnConstraintKind::Null => {
                column.nullable = true;
                continue;
            }
            ColumnConstraintKind::Default(expr) => {
                column.default = Some(expr);
                continue;
            }
            ColumnConstraintKind::PrimaryKey => TableConstraintKind::PrimaryKey {
                columns: vec![def.name.clone()],
                include: Vec::new(),
            },
            ColumnConstraintKind::Unique { nulls_not_distinct } => TableConstraintKind::Unique {
                columns: vec![def.name.clone()],
                include: Vec::new(),
                nulls_not_distinct,
            },
            ColumnConstraintKind::Check { expr, .. } => TableConstraintKind::Check { expr },
            ColumnConstraintKind::References(target) => TableConstraintKind::ForeignKey {
                columns: vec![def.name.clone()],
                target,
            },
            ColumnConstraintKind::Identity { .. } | ColumnConstraintKind::Generated { .. } => {
                continue;
            }
        };
        pending.push(TableConstraint {
            name: constraint.name,
            kind,
            deferrable: constraint.deferrable,
            initially_deferred: constraint.initially_deferred,
            not_valid: false,
        });
    }
    Ok(())
}

/// Copy the columns of a `LIKE` source, appending them to `table`.
fn copy_like_columns(table: &mut Table, source: &Table, options: LikeOptions) {
    for column in &source.columns {
        let mut copy = Column::new(&column.name, &column.full_type());
        copy.nullable = column.nullable;
        copy.collation = column.collation.clone();
        if options.has(LikeOptions::DEFAULTS) {
            copy.default = column.default.clone();
        }
        if options.has(LikeOptions::IDENTITY) {
            copy.identity = column.identity.clone();
        }
        if options.has(LikeOptions::GENERATED) {
            copy.generated = column.generated.clone();
        }
        if options.has(LikeOptions::COMMENTS) {
            copy.comment = column.comment.clone();
        }
        table.add_column(copy);
    }
}

/// Copy the check constraints and indexes a `LIKE` clause asks for. Checks
/// keep their names; indexes and their constraints are renamed for `table`.
fn copy_like_objects(table: &mut Table, source: &Table, options: LikeOptions, names: &mut Names) {
    let comments = options.has(LikeOptions::COMMENTS);
    if options.has(LikeOptions::CONSTRAINTS) {
        for check in source
            .constraints
            .values()
            .filter(|c| c.kind == ConstraintKind::Check)
        {
            let mut copy = check.clone();
            copy.table = table.name.clone();
            copy.schema = table.schema.clone();
            if !comments {
                copy.comment = None;
            }
            names.claim(&copy.name);
            table.constraints.insert(copy.name.clone(), copy);
        }
    }
    if !options.has(LikeOptions::INDEXES) {
        return;
    }
    for index in source.indexes.values() {
        let backing = source.constraints.get(&index.name).filter(|c| {
            matches!(
                c.kind,
                ConstraintKind::PrimaryKey | ConstraintKind::Unique | ConstraintKind::Exclusion
            )
        });
        let labels = dedupe_labels(
            index
                .columns
                .iter()
                .map(|c| {
                    if c.expression {
                        "expr".to_string()
                    } else {
                        c.name.clone()
                    }
                })
                .chain(index.include.iter().cloned()),
        );
        let name = match backing.map(|c| c.kind) {
            Some(ConstraintKind::PrimaryKey) => names.choose(&table.name, None, "pkey"),
            Some(ConstraintKind::Exclusion) => {
                names.choose(&table.name, joined(&labels).as_deref(), "excl")
            }
            Some(_) => names.choose(&table.name, joined(&labels).as_deref(), "key"),
            None => names.choose(&table.name, joined(&labels).as_deref(), "idx"),
        };

        let mut copy = index.clone();
        copy.schema = table.schema.clone();
        copy.table = table.name.clone();
        copy.name = name.clone();
        if !comments {
            copy.comment = None;
        }
        table.indexes.insert(name.clone(), copy);

        if let Some(constraint) = backing {
            let mut copy = constraint.clone();
            copy.schema = table.schema.clone();
            copy.table = table.name.clone();
            copy.name = name.clone();
            if !comments {
                copy.comment = None;
            }
            table.constraints.insert(name, copy);
        }
    }
}

/// Primary key and unique constraints a partition takes from its parent,
/// named for the partition. Their indexes belong to the parent's.
fn inherit_keys(table: &mut Table, parent: &Table, names: &mut Names) {
    for constraint in parent.constraints.values() {
        let name = match constraint.kind {
            ConstraintKind::PrimaryKey => names.choose(&table.name, None, "pkey"),
            ConstraintKind::Unique => {
                let include = parent
                    .indexes
                    .get(&constraint.name)
                    .map(|i| i.include.clone())
                    .unwrap_or_default();
                let labels: Vec<String> = constraint
                    .column_names()
                    .into_iter()
                    .chain(include)
                    .collect();
                names.choose(&table.name, joined(&labels).as_deref(), "key")
            }
            _ => continue,
        };
        let mut copy = constraint.clone();
        copy.schema = table.schema.clone();
        copy.table = table.name.clone();
        copy.name = name.clone();
        copy.comment = None;
        table.constraints.insert(name, copy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::NoIgnore;
    use crate::parse::grammar::parse_statement;
    use crate::parse::split::split_statements;

    fn build(sql: &str) -> Result<Model> {
        let mut builder = Builder::new("public", &NoIgnore)?;
        for statement in split_statements(sql)? {
            builder.apply(parse_statement(&statement)?)?;
        }
        builder.resolve_deferred()?;
        builder.apply_triggers()?;
        Ok(builder.finish())
    }

    fn table(model: &Model, name: &str) -> Table {
        model.schema("public").unwrap().table(name).unwrap()
    }

    #[test]
    fn test_inline_constraints_become_table_constraints() {
        let model = build(
            "CREATE TABLE accounts (id int PRIMARY KEY);
             CREATE TABLE users (
                id bigint PRIMARY KEY,
                email text UNIQUE,
                age int CHECK (age >= 0),
                account_id int REFERENCES accounts,
                lo int, hi int,
                CHECK (lo < hi),
                UNIQUE (lo, hi)
             );",
        )
        .unwrap();
        let users = table(&model, "users");
        let names: Vec<&str> = users.constraints.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            [
                "users_age_check",
                "users_check",
                "users_pkey",
                "users_email_key",
                "users_lo_hi_key",
                "users_account_id_fkey",
            ]
        );
        assert!(!users.column("id").unwrap().nullable);
        assert_eq!(
            users.constraints["users_age_check"].check_clause.as_deref(),
            Some("CHECK (age >= 0)")
        );
        let fk = users.constraints["users_account_id_fkey"]
            .foreign_key
            .clone()
            .unwrap();
        assert_eq!(fk.table, "accounts");
        assert_eq!(fk.columns, ConstraintColumn::numbered(&["id"]));
        assert_eq!(users.indexes["users_pkey"].kind, IndexKind::Primary);
        assert_eq!(users.indexes["users_email_key"].kind, IndexKind::Unique);
        assert!(!users.indexes.contains_key("users_age_check"));
    }

    #[test]
    fn test_colliding_names_get_counters() {
        let model = build(
            "CREATE TABLE items (
                price int CHECK (price > 0) CHECK (price < 1000)
             );
             CREATE INDEX ON items (price);
             CREATE INDEX ON items (price);",
        )
        .unwrap();
        let items = table(&model, "items");
        assert!(items.constraints.contains_key("items_price_check"));
        assert!(items.constraints.contains_key("items_price_check1"));
        assert!(items.indexes.contains_key("items_price_idx"));
        assert!(items.indexes.contains_key("items_price_idx1"));
    }

    #[test]
    fn test_expression_index_names() {
        let model = build(
            "CREATE TABLE people (first text, last text, id int);
             CREATE INDEX ON people (lower(first), lower(last));
             CREATE INDEX ON people ((id + 1));
             CREATE INDEX ON people (id) INCLUDE (first);",
        )
        .unwrap();
        let people = table(&model, "people");
        let names: Vec<&str> = people.indexes.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["people_lower_lower1_idx", "people_expr_idx", "people_id_first_idx"]
        );
        assert!(people.indexes["people_expr_idx"].is_expression);
    }

    #[test]
    fn test_serial_creates_owned_sequence() {
        let model = build("CREATE TABLE app.tickets (id serial PRIMARY KEY);").unwrap();
        let schema = model.schema("app").unwrap();
        let tickets = schema.table("tickets").unwrap();
        let id = tickets.column("id").unwrap();
        assert_eq!(id.data_type, "integer");
        assert!(!id.nullable);
        assert_eq!(
            id.default.as_deref(),
            Some("nextval('app.tickets_id_seq'::regclass)")
        );
        let sequence = schema.sequence("tickets_id_seq").unwrap();
        assert_eq!(sequence.data_type.as_deref(), Some("integer"));
        assert_eq!(
            sequence.owned_by,
            Some(SequenceOwner {
                table: "tickets".into(),
                column: "id".into(),
            })
        );
    }

    #[test]
    fn test_dated_table_reuses_parent_sequence() {
        let model = build(
            "CREATE TABLE events (id bigserial, at date) PARTITION BY RANGE (at);
             CREATE TABLE events_2024_01 (id bigserial, at date);",
        )
        .unwrap();
        let child = table(&model, "events_2024_01");
        assert_eq!(
            child.column("id").unwrap().default.as_deref(),
            Some("nextval('public.events_id_seq'::regclass)")
        );
        let schema = model.schema("public").unwrap();
        assert!(schema.sequence("events_2024_01_id_seq").is_none());
    }

    #[test]
    fn test_partition_of_copies_columns_and_keys() {
        let model = build(
            "CREATE TABLE measurements (
                id int, region text NOT NULL DEFAULT 'eu', v int,
                PRIMARY KEY (id, region)
             ) PARTITION BY LIST (region);
             CREATE TABLE measurements_eu PARTITION OF measurements (
                v WITH OPTIONS NOT NULL
             ) FOR VALUES IN ('eu');",
        )
        .unwrap();
        let parent = table(&model, "measurements");
        let pk: Vec<String> = parent.primary_key().unwrap().column_names();
        assert_eq!(pk, ["region", "id"]);

        let child = table(&model, "measurements_eu");
        assert_eq!(child.columns.len(), 3);
        assert!(!child.column("v").unwrap().nullable);
        assert_eq!(child.column("region").unwrap().default.as_deref(), Some("'eu'"));
        assert_eq!(
            child.partition_of,
            Some(TableRef::new("public", "measurements"))
        );
        assert_eq!(
            child.primary_key().unwrap().column_names(),
            ["region", "id"]
        );
        assert_eq!(child.primary_key().unwrap().name, "measurements_eu_pkey");
        assert!(child.indexes.is_empty());
    }

    #[test]
    fn test_like_waits_for_its_source() {
        let model = build(
            "CREATE TABLE archive (LIKE live INCLUDING ALL, archived_at timestamptz);
             CREATE INDEX ON archive (archived_at);
             CREATE TABLE live (
                id int PRIMARY KEY,
                body text DEFAULT '' CHECK (body <> '')
             );
             COMMENT ON COLUMN live.body IS 'payload';",
        )
        .unwrap();
        let archive = table(&model, "archive");
        let columns: Vec<&str> = archive.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, ["id", "body", "archived_at"]);
        assert_eq!(archive.column("body").unwrap().default.as_deref(), Some("''"));
        assert!(archive.constraints.contains_key("live_body_check"));
        assert!(archive.constraints.contains_key("archive_pkey"));
        assert!(archive.indexes.contains_key("archive_pkey"));
        assert!(archive.indexes.contains_key("archive_archived_at_idx"));
        // the deferred copy sees comments made before it ran
        assert_eq!(
            archive.column("body").unwrap().comment.as_deref(),
            Some("payload")
        );
    }

    #[test]
    fn test_like_without_source_is_unresolved() {
        let err = build("CREATE TABLE copy (LIKE missing);").unwrap_err();
        assert!(
            matches!(&err, Error::UnresolvedReference { kind: "table", name } if name == "public.missing"),
            "{err:?}"
        );
    }

    #[test]
    fn test_trigger_before_table() {
        let model = build(
            "CREATE TRIGGER touch BEFORE UPDATE ON notes
                FOR EACH ROW EXECUTE FUNCTION touch_updated_at();
             CREATE TABLE notes (id int, updated_at timestamptz);",
        )
        .unwrap();
        let notes = table(&model, "notes");
        let trigger = &notes.triggers["touch"];
        assert_eq!(trigger.function, "touch_updated_at");
        assert_eq!(trigger.level, pgir_model::TriggerLevel::Row);
    }

    #[test]
    fn test_trigger_on_missing_table() {
        let err = build(
            "CREATE TRIGGER t AFTER INSERT ON nowhere EXECUTE FUNCTION f();",
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { kind: "table", .. }));
    }

    #[test]
    fn test_overloads_have_distinct_keys() {
        let model = build(
            "CREATE PROCEDURE p(a integer) LANGUAGE sql AS $$ SELECT 1 $$;
             CREATE PROCEDURE p(a text) LANGUAGE sql AS $$ SELECT 2 $$;
             CREATE FUNCTION pair(OUT a int, OUT b text) LANGUAGE sql AS $$ SELECT 1, 'x' $$;",
        )
        .unwrap();
        let schema = model.schema("public").unwrap();
        assert!(schema.procedure("p(integer)").is_some());
        assert!(schema.procedure("p(text)").is_some());
        assert_eq!(schema.function("pair()").unwrap().return_type, "record");
    }

    #[test]
    fn test_exclusion_constraint_and_index() {
        let model = build(
            "CREATE TABLE bookings (
                room int,
                during tsrange,
                EXCLUDE USING gist (room WITH =, during WITH &&)
             );",
        )
        .unwrap();
        let bookings = table(&model, "bookings");
        let constraint = &bookings.constraints["bookings_room_during_excl"];
        assert_eq!(constraint.kind, ConstraintKind::Exclusion);
        let index = &bookings.indexes["bookings_room_during_excl"];
        assert_eq!(index.method, "gist");
        assert_eq!(index.kind, IndexKind::Regular);
        assert_eq!(index.columns.len(), 2);
    }

    #[test]
    fn test_ignored_table_with_trigger_becomes_external() {
        struct IgnoreAudit;
        impl IgnorePredicate for IgnoreAudit {
            fn is_ignored(&self, kind: ObjectKind, name: &str) -> bool {
                kind == ObjectKind::Table && name.starts_with("audit")
            }
        }
        let mut builder = Builder::new("public", &IgnoreAudit).unwrap();
        let sql = "CREATE TABLE audit_log (id int, msg text);
                   CREATE TABLE audit_old (id int);
                   CREATE TRIGGER keep AFTER INSERT ON audit_log
                       FOR EACH STATEMENT EXECUTE FUNCTION notify_audit();";
        for statement in split_statements(sql).unwrap() {
            builder.apply(parse_statement(&statement).unwrap()).unwrap();
        }
        builder.resolve_deferred().unwrap();
        builder.apply_triggers().unwrap();
        let model = builder.finish();
        let schema = model.schema("public").unwrap();
        let stub = schema.table("audit_log").unwrap();
        assert!(stub.external);
        assert!(stub.columns.is_empty());
        assert!(stub.triggers.contains_key("keep"));
        assert!(schema.table("audit_old").is_none());
    }

    #[test]
    fn test_alter_table_actions() {
        let model = build(
            "CREATE TABLE orders (id int, total numeric(10,2));
             CREATE TABLE orders_2023 (id int, total numeric(10,2));
             ALTER TABLE orders ADD CONSTRAINT orders_pkey PRIMARY KEY (id),
                ALTER COLUMN total SET DEFAULT 0,
                ENABLE ROW LEVEL SECURITY;
             ALTER TABLE ONLY orders ALTER COLUMN total SET NOT NULL;
             ALTER TABLE orders ATTACH PARTITION orders_2023 FOR VALUES IN (2023);",
        )
        .unwrap();
        let orders = table(&model, "orders");
        assert!(orders.rls_enabled);
        assert!(!orders.column("total").unwrap().nullable);
        assert_eq!(orders.column("total").unwrap().default.as_deref(), Some("0"));
        assert!(orders.indexes.contains_key("orders_pkey"));
        let child = table(&model, "orders_2023");
        assert_eq!(child.partition_of, Some(TableRef::new("public", "orders")));
    }

    #[test]
    fn test_default_privileges_expand_all() {
        let model = build(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL ON SEQUENCES TO app;
             ALTER DEFAULT PRIVILEGES GRANT SELECT ON TABLES TO app;",
        )
        .unwrap();
        let privileges = model.schema("public").unwrap().default_privileges();
        assert_eq!(privileges.len(), 1);
        assert_eq!(privileges[0].privileges, ["SELECT", "UPDATE", "USAGE"]);
    }

    #[test]
    fn test_domain_checks_are_named() {
        let model = build(
            "CREATE DOMAIN posint AS integer CHECK (VALUE > 0) CHECK (VALUE < 100);",
        )
        .unwrap();
        let ty = model.schema("public").unwrap().type_def("posint").unwrap();
        let TypeKind::Domain(domain) = ty.kind else {
            panic!("expected a domain");
        };
        let names: Vec<&str> = domain.constraints.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["posint_check", "posint_check1"]);
    }

    #[test]
    fn test_routine_comment_without_arguments() {
        let model = build(
            "CREATE FUNCTION touch() RETURNS trigger LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END$$;
             CREATE PROCEDURE p(n int) LANGUAGE sql AS $$SELECT 1$$;
             CREATE PROCEDURE p(t text) LANGUAGE sql AS $$SELECT 1$$;
             COMMENT ON FUNCTION touch IS 'sets updated_at';
             COMMENT ON PROCEDURE p IS 'which one';",
        )
        .unwrap();
        let schema = model.schema("public").unwrap();
        let touch = schema.functions().into_iter().find(|f| f.name == "touch").unwrap();
        assert_eq!(touch.comment.as_deref(), Some("sets updated_at"));
        let procedures = schema.procedures();
        assert_eq!(procedures.len(), 2);
        assert!(procedures.iter().all(|p| p.comment.is_none()));
    }
}
