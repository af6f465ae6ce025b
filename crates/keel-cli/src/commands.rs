use std::collections::HashMap;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use keel_table::{DataType, Group, Key, SchemaConfig, TableKey, TableRef};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Schema(args) => cmd_schema(args, cli.format),
        Command::Cascade(args) => cmd_cascade(args, cli.format),
    }
}

struct ColumnSummary {
    name: String,
    data_type: DataType,
    nullable: bool,
    indexed: bool,
    target: Option<String>,
}

struct TableSummary {
    name: String,
    primary_key: Option<usize>,
    columns: Vec<ColumnSummary>,
}

fn load_group(path: &std::path::Path, replication: bool) -> anyhow::Result<Group> {
    let mut schema = SchemaConfig::load(path)
        .with_context(|| format!("failed to load schema {}", path.display()))?;
    schema.group.replication |= replication;
    Group::from_schema(&schema)
        .with_context(|| format!("failed to build group from {}", path.display()))
}

fn tables(group: &Group) -> anyhow::Result<Vec<TableRef>> {
    Ok(group
        .table_keys()
        .into_iter()
        .map(|key| group.get_table(key))
        .collect::<Result<_, _>>()?)
}

fn summarize(table: &TableRef) -> anyhow::Result<TableSummary> {
    let mut columns = Vec::new();
    for ndx in 0..table.get_column_count()? {
        let data_type = table.get_column_type(ndx)?;
        let target = if data_type.is_link() {
            Some(table.get_link_target(ndx)?.get_name()?)
        } else {
            None
        };
        columns.push(ColumnSummary {
            name: table.get_column_name(ndx)?,
            data_type,
            nullable: table.is_nullable(ndx)?,
            indexed: table.has_search_index(ndx)?,
            target,
        });
    }
    Ok(TableSummary {
        name: table.get_name()?,
        primary_key: table.get_primary_key()?,
        columns,
    })
}

fn cmd_schema(args: SchemaArgs, format: OutputFormat) -> anyhow::Result<()> {
    let group = load_group(&args.path, false)?;
    let summaries = tables(&group)?
        .iter()
        .map(summarize)
        .collect::<anyhow::Result<Vec<_>>>()?;

    if format == OutputFormat::Json {
        let out: Vec<_> = summaries
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "primary_key": t.primary_key,
                    "columns": t.columns.iter().map(|c| json!({
                        "name": c.name,
                        "type": c.data_type,
                        "nullable": c.nullable,
                        "indexed": c.indexed,
                        "target": c.target,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for table in &summaries {
        println!("{}", table.name.bold());
        for (ndx, column) in table.columns.iter().enumerate() {
            let mut line = format!(
                "  {:>2} {:<20} {}",
                ndx,
                column.name,
                column.data_type.to_string().cyan()
            );
            if let Some(target) = &column.target {
                line.push_str(&format!(" -> {}", target.yellow()));
            }
            if column.nullable {
                line.push_str(&format!(" {}", "nullable".dimmed()));
            }
            if column.indexed {
                line.push_str(&format!(" {}", "indexed".dimmed()));
            }
            if table.primary_key == Some(ndx) {
                line.push_str(&format!(" {}", "primary key".green()));
            }
            println!("{line}");
        }
    }
    Ok(())
}

/// Create `count` objects per table and point every link column of object
/// `i` at object `i` of its target. Self links point at object `i + 1`.
fn populate(tables: &[TableRef], count: usize) -> anyhow::Result<()> {
    let mut keys: HashMap<TableKey, Vec<Key>> = HashMap::new();
    for table in tables {
        keys.insert(table.get_key(), table.create_objects(count)?);
    }
    if count == 0 {
        return Ok(());
    }
    for table in tables {
        let own = &keys[&table.get_key()];
        for ndx in 0..table.get_column_count()? {
            let data_type = table.get_column_type(ndx)?;
            if !data_type.is_link() {
                continue;
            }
            let target = table.get_link_target(ndx)?;
            let targets = &keys[&target.get_key()];
            let shift = usize::from(target == *table);
            for (i, key) in own.iter().enumerate() {
                let to = targets[(i + shift) % targets.len()];
                let obj = table.get_object(*key)?;
                match data_type {
                    DataType::Link => obj.set_link(ndx, to)?,
                    _ => obj.get_linklist(ndx)?.add(to)?,
                }
            }
        }
    }
    Ok(())
}

fn sizes(tables: &[TableRef]) -> anyhow::Result<Vec<(String, usize)>> {
    tables
        .iter()
        .map(|t| -> anyhow::Result<(String, usize)> { Ok((t.get_name()?, t.size()?)) })
        .collect()
}

fn cmd_cascade(args: CascadeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let group = load_group(&args.path, true)?;
    let all = tables(&group)?;
    populate(&all, args.objects)?;

    let victim = group
        .get_table_by_name(&args.table)
        .with_context(|| format!("no table named {:?}", args.table))?;
    let Some(first) = victim.keys()?.first().copied() else {
        bail!("table {:?} has no objects", args.table);
    };

    let before = sizes(&all)?;
    if let Some(log) = group.change_log() {
        log.take();
    }
    let removed = victim.remove_object_recursive(first)?;
    let after = sizes(&all)?;
    let instructions = group
        .change_log()
        .map(|log| log.instructions())
        .unwrap_or_default();

    if format == OutputFormat::Json {
        let log = if args.log { json!(instructions) } else { json!(null) };
        let out = json!({
            "table": args.table,
            "key": first,
            "removed": removed,
            "tables": before.iter().zip(&after).map(|((name, b), (_, a))| json!({
                "name": name,
                "before": b,
                "after": a,
            })).collect::<Vec<_>>(),
            "log": log,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Removed {}[{}]: {} object(s) gone",
        args.table.bold(),
        first.to_string().yellow(),
        removed.to_string().bold()
    );
    for ((name, b), (_, a)) in before.iter().zip(&after) {
        let change = if a < b {
            format!("{b} -> {a}").red().to_string()
        } else {
            format!("{b}").dimmed().to_string()
        };
        println!("  {name:<20} {change}");
    }
    if args.log {
        for instruction in &instructions {
            println!("  {}", serde_json::to_string(instruction)?.dimmed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"
[[tables]]
name = "person"

[[tables.columns]]
name = "name"
type = "string"

[[tables.columns]]
name = "pets"
type = "link"
list = true
target = "dog"
strength = "strong"

[[tables]]
name = "dog"

[[tables.columns]]
name = "name"
type = "string"
indexed = true
"#;

    fn schema_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();
        file
    }

    #[test]
    fn summary_names_link_targets() {
        let file = schema_file();
        let group = load_group(file.path(), false).unwrap();
        let person = summarize(&group.get_table_by_name("person").unwrap()).unwrap();
        assert_eq!(person.columns.len(), 2);
        assert_eq!(person.columns[1].data_type, DataType::LinkList);
        assert_eq!(person.columns[1].target.as_deref(), Some("dog"));
        let dog = summarize(&group.get_table_by_name("dog").unwrap()).unwrap();
        assert!(dog.columns[0].indexed);
    }

    #[test]
    fn populated_strong_lists_cascade() {
        let file = schema_file();
        let group = load_group(file.path(), true).unwrap();
        let all = tables(&group).unwrap();
        populate(&all, 3).unwrap();
        let person = group.get_table_by_name("person").unwrap();
        let dog = group.get_table_by_name("dog").unwrap();
        let first = person.keys().unwrap()[0];
        person.remove_object_recursive(first).unwrap();
        assert_eq!(person.size().unwrap(), 2);
        assert_eq!(dog.size().unwrap(), 2);
        assert!(!group.change_log().unwrap().is_empty());
    }

    #[test]
    fn missing_schema_file_is_reported() {
        let err = load_group(std::path::Path::new("/nonexistent/keel.toml"), false).unwrap_err();
        assert!(err.to_string().contains("failed to load schema"));
    }
}
