use crate::cli::options::OutputFormat;
use crate::types::{Diagnostic, ModuleManifest, ScriptUnit};
use anyhow::Result;
use serde::Serialize;
use serde_json::json;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_message(format: OutputFormat, message: &str) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&json!({ "message": message })),
        OutputFormat::Text => {
            println!("{message}");
            Ok(())
        }
    }
}

pub fn print_codes<S: AsRef<str> + Serialize>(format: OutputFormat, codes: &[S]) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&codes),
        OutputFormat::Text => {
            for code in codes {
                println!("{}", code.as_ref());
            }
            Ok(())
        }
    }
}

pub fn print_introspection(
    format: OutputFormat,
    package: Option<String>,
    class: Option<String>,
    full_class_name: Option<String>,
    imports: Vec<String>,
) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&json!({
            "package": package,
            "className": class,
            "fullClassName": full_class_name,
            "imports": imports,
        }));
    }

    let none = || "-".to_string();
    println!("📦 Package:    {}", package.unwrap_or_else(none));
    println!("🏷️  Class:      {}", class.unwrap_or_else(none));
    println!("🎯 Full name:  {}", full_class_name.unwrap_or_else(none));
    if !imports.is_empty() {
        println!("📥 Imports ({}):", imports.len());
        for import in &imports {
            println!("  • {import}");
        }
    }
    Ok(())
}

pub fn print_diagnostics(format: OutputFormat, diagnostics: &[Diagnostic]) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&diagnostics);
    }

    if diagnostics.is_empty() {
        println!("✅ Compiled without errors");
    } else {
        println!("❌ {} compilation error(s):", diagnostics.len());
        for diagnostic in diagnostics {
            println!("  • {diagnostic}");
        }
    }
    Ok(())
}

pub fn print_manifest(format: OutputFormat, manifest: &ModuleManifest) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(manifest);
    }

    println!("📦 Module {}", manifest.code);
    println!("  Description: {}", manifest.description);
    println!("  License:     {}", manifest.license);
    println!("  Installed:   {}", yes_no(manifest.installed));
    println!("  Active:      {}", yes_no(manifest.active));
    println!("  Downloaded:  {}", yes_no(manifest.is_downloaded()));
    if let Some(script) = &manifest.script_code {
        println!("  Script:      {script}");
    }
    if !manifest.items.is_empty() {
        println!("  Items ({}):", manifest.items.len());
        for item in &manifest.items {
            match &item.applies_to {
                Some(scope) => println!("    • {} {} ({})", item.item_type, item.item_code, scope),
                None => println!("    • {} {}", item.item_type, item.item_code),
            }
        }
    }
    Ok(())
}

pub fn print_modules(format: OutputFormat, modules: &[ModuleManifest]) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&modules);
    }

    if modules.is_empty() {
        println!("No modules found");
        return Ok(());
    }
    for module in modules {
        let state = match (module.installed, module.active) {
            (true, true) => "✅ installed",
            (true, false) => "⏸️  disabled",
            (false, _) => "📥 not installed",
        };
        println!(
            "{:<30} {:<18} {} item(s)",
            module.code,
            state,
            module.items.len()
        );
    }
    Ok(())
}

pub fn print_scripts(format: OutputFormat, units: &[ScriptUnit], cached: &[String]) -> Result<()> {
    if format == OutputFormat::Json {
        let entries: Vec<_> = units
            .iter()
            .map(|unit| {
                json!({
                    "code": unit.code,
                    "active": unit.active,
                    "error": unit.error,
                    "compiled": cached.contains(&unit.code),
                })
            })
            .collect();
        return print_json(&entries);
    }

    for unit in units {
        let state = if unit.error {
            "❌"
        } else if cached.contains(&unit.code) {
            "✅"
        } else {
            "•"
        };
        let active = if unit.active { "" } else { " (inactive)" };
        println!("{state} {}{active}", unit.code);
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
