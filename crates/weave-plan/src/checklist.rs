use weave_types::DependencyRequirement;

fn dep(package: &str, dev: bool, reason: &str) -> DependencyRequirement {
    DependencyRequirement {
        package: package.to_string(),
        dev,
        reason: reason.to_string(),
    }
}

/// Static library-to-package mapping for the research task. The checklist
/// always carries at least one react entry.
pub fn build_dependency_checklist(
    project_type: &str,
    tech_stack: &[String],
    ui_library: Option<&str>,
) -> Vec<DependencyRequirement> {
    let mut checklist = vec![
        dep("react", false, "core runtime"),
        dep("react-dom", false, "dom renderer"),
    ];

    match project_type {
        "next-js" => checklist.push(dep("next", false, "framework runtime")),
        "react-vite" => checklist.push(dep("vite", true, "build tooling")),
        _ => {}
    }

    let mut mentioned: Vec<String> = tech_stack.iter().map(|s| s.to_lowercase()).collect();
    if let Some(library) = ui_library {
        mentioned.push(library.to_lowercase());
    }

    for entry in mentioned {
        match entry.as_str() {
            "shadcn" | "shadcn-ui" => {
                push_unique(&mut checklist, dep("@radix-ui/react-slot", false, "shadcn primitives"));
                push_unique(
                    &mut checklist,
                    dep("class-variance-authority", false, "shadcn variants"),
                );
                push_unique(&mut checklist, dep("clsx", false, "class composition"));
            }
            "antd" | "ant-design" => {
                push_unique(&mut checklist, dep("antd", false, "component library"))
            }
            "element-plus" => push_unique(
                &mut checklist,
                dep("element-plus", false, "component library"),
            ),
            "mui" | "material-ui" => push_unique(
                &mut checklist,
                dep("@mui/material", false, "component library"),
            ),
            "tailwind" | "tailwindcss" => {
                push_unique(&mut checklist, dep("tailwindcss", true, "utility styling"));
                push_unique(&mut checklist, dep("postcss", true, "css pipeline"));
                push_unique(&mut checklist, dep("autoprefixer", true, "css pipeline"));
            }
            "zustand" => push_unique(&mut checklist, dep("zustand", false, "state store")),
            "redux" | "redux-toolkit" => push_unique(
                &mut checklist,
                dep("@reduxjs/toolkit", false, "state store"),
            ),
            "router" | "react-router" => push_unique(
                &mut checklist,
                dep("react-router-dom", false, "client routing"),
            ),
            "recharts" => push_unique(&mut checklist, dep("recharts", false, "charting")),
            _ => {}
        }
    }

    checklist
}

fn push_unique(checklist: &mut Vec<DependencyRequirement>, entry: DependencyRequirement) {
    if !checklist.iter().any(|c| c.package == entry.package) {
        checklist.push(entry);
    }
}
