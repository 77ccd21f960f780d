//! Package tables.

use archivist_core::debcheck::DependencyIssue;
use archivist_core::reader::Diagnostic;
use archivist_schema::{BinaryPackage, NewQueueEntry, SourcePackage};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, ContentArrangement, Table};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::White)));
    table
}

pub fn sources<'a>(packages: impl IntoIterator<Item = &'a SourcePackage>) -> Table {
    let mut t = table(&["Source", "Version", "Component", "Architectures", "Binaries"]);
    for pkg in packages {
        let archs: Vec<&str> = pkg.architectures.iter().map(|a| a.as_str()).collect();
        let binaries: Vec<&str> = pkg
            .expected_binaries
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        t.add_row(vec![
            Cell::new(&pkg.name),
            Cell::new(pkg.version.as_str()),
            Cell::new(&pkg.component),
            Cell::new(archs.join(" ")),
            Cell::new(binaries.join(", ")),
        ]);
    }
    t
}

pub fn binaries<'a>(packages: impl IntoIterator<Item = &'a BinaryPackage>) -> Table {
    let mut t = table(&["Package", "Version", "Arch", "Source", "Section"]);
    for pkg in packages {
        let source = if pkg.source_version == pkg.version {
            pkg.source_name.clone()
        } else {
            format!("{} ({})", pkg.source_name, pkg.source_version)
        };
        t.add_row(vec![
            Cell::new(&pkg.name),
            Cell::new(pkg.version.as_str()),
            Cell::new(pkg.architecture.as_str()),
            Cell::new(source),
            Cell::new(
                pkg.override_info
                    .as_ref()
                    .map_or("", |o| o.section.as_str()),
            ),
        ]);
    }
    t
}

pub fn new_queue(entries: &[NewQueueEntry]) -> Table {
    let mut t = table(&["Source", "Version", "Component", "Suite"]);
    for entry in entries {
        t.add_row(vec![
            Cell::new(&entry.source_name),
            Cell::new(entry.source_version.as_str()),
            Cell::new(&entry.component),
            Cell::new(&entry.destination_suite),
        ]);
    }
    t
}

pub fn diagnostics(diagnostics: &[Diagnostic]) -> Table {
    let mut t = table(&["Package", "Version", "Note"]);
    for d in diagnostics {
        t.add_row(vec![
            Cell::new(&d.package),
            Cell::new(&d.version),
            Cell::new(&d.message).fg(Color::Yellow),
        ]);
    }
    t
}

pub fn dependency_issues(issues: &[DependencyIssue]) -> Table {
    let mut t = table(&["Package", "Version", "Arch", "Problem"]);
    for issue in issues {
        let mut problems: Vec<String> = issue
            .missing
            .iter()
            .map(|m| {
                format!(
                    "missing {}",
                    m.unsat_dependency.as_deref().unwrap_or(m.name.as_str())
                )
            })
            .collect();
        problems.extend(
            issue
                .conflicts
                .iter()
                .map(|c| format!("{} conflicts with {}", c.pkg1.name, c.pkg2.name)),
        );
        t.add_row(vec![
            Cell::new(&issue.package.name),
            Cell::new(&issue.package.version),
            Cell::new(issue.package.architectures.join(" ")),
            Cell::new(problems.join("\n")).fg(Color::Red),
        ]);
    }
    t
}
