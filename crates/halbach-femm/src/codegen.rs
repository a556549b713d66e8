//! Lua code generation for FEMM magnetostatic problems

use minijinja::{context, Environment};
use nalgebra::Vector2;

use crate::error::WigglerResult;
use crate::femm::FemmDocument;
use crate::EmitConfig;

const FEMM_TEMPLATE: &str = r##"-- FEMM magnetostatic problem - Halbach wiggler
-- {{ header_comment }}
--
-- Generated: {{ timestamp }}
-- Length unit: {{ units }}
-- Cell pitch: {{ cell_pitch }}
-- Lattice length: {{ lattice_length }}
--
-- Run with: femm -lua-script=<this file>

newdocument(0)
mi_hidegrid()

-- Problem: frequency, units, type, precision, depth, min angle
mi_probdef(0, "{{ units }}", "planar", {{ precision }}, {{ depth }}, {{ min_angle }})

-- =============================================================================
-- Materials
-- =============================================================================
{% for material in materials %}
mi_getmaterial({{ material }})
{% endfor %}

-- =============================================================================
-- Boundary conditions
-- =============================================================================
{% for bc in boundaries %}
mi_addboundprop({{ bc.name }}, 0, 0, 0, 0, 0, 0, {{ bc.c0 }}, 0, {{ bc.format }})
{% endfor %}

-- =============================================================================
-- Nodes and segments
-- =============================================================================
{% for node in nodes %}
mi_addnode({{ node.x }}, {{ node.y }})
{% endfor %}
{% for seg in segments %}
mi_addsegment({{ seg.x1 }}, {{ seg.y1 }}, {{ seg.x2 }}, {{ seg.y2 }})
{% endfor %}

mi_clearselected()
{% for seg in boundary_segments %}
mi_selectsegment({{ seg.mx }}, {{ seg.my }})
mi_setsegmentprop({{ seg.boundary }}, 0, 1, 0, 0)
mi_clearselected()
{% endfor %}

-- =============================================================================
-- Block labels: material, automesh, mesh size, circuit, magnetization, group
-- =============================================================================
{% for label in labels %}
mi_addblocklabel({{ label.x }}, {{ label.y }})
mi_selectlabel({{ label.x }}, {{ label.y }})
mi_setblockprop({{ label.material }}, {{ label.automesh }}, {{ label.mesh_size }}, "", {{ label.magdir }}, {{ label.group }}, 0)
mi_clearselected()
{% endfor %}

mi_zoom({{ zoom.x1 }}, {{ zoom.y1 }}, {{ zoom.x2 }}, {{ zoom.y2 }})
mi_saveas({{ fem_file }})
{% if contour %}

-- =============================================================================
-- Solve and extract |B| along the beam axis
-- =============================================================================
mi_analyze(1)
mi_loadsolution()
mo_addcontour({{ contour.x1 }}, {{ contour.y1 }})
mo_addcontour({{ contour.x2 }}, {{ contour.y2 }})
mo_makeplot(1, {{ contour.samples }}, {{ contour.field_file }}, 1)
mo_clearcontour()
quit()
{% endif %}
"##;

/// Generate a FEMM Lua script from a document
pub fn generate_femm_script(doc: &FemmDocument, emit: &EmitConfig) -> WigglerResult<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("femm", FEMM_TEMPLATE)?;

    let template = env.get_template("femm")?;

    let materials: Vec<_> = doc.materials.iter().map(|m| lua_string(m)).collect();

    let boundaries: Vec<_> = doc.boundaries.iter().map(|b| {
        serde_json::json!({
            "name": lua_string(&b.name),
            "c0": lua_number(b.kind.c0()),
            "format": b.kind.format_code(),
        })
    }).collect();

    let nodes: Vec<_> = doc.nodes.iter().map(|p| {
        serde_json::json!({ "x": lua_number(p.x), "y": lua_number(p.y) })
    }).collect();

    let segments: Vec<_> = doc.segments.iter().map(|s| {
        serde_json::json!({
            "x1": lua_number(s.start.x),
            "y1": lua_number(s.start.y),
            "x2": lua_number(s.end.x),
            "y2": lua_number(s.end.y),
        })
    }).collect();

    let boundary_segments: Vec<_> = doc.boundary_segments().map(|s| {
        let mid = s.midpoint();
        serde_json::json!({
            "mx": lua_number(mid.x),
            "my": lua_number(mid.y),
            "boundary": lua_string(s.boundary.as_deref().unwrap_or_default()),
        })
    }).collect();

    let labels: Vec<_> = doc.labels.iter().map(|l| {
        serde_json::json!({
            "x": lua_number(l.at.x),
            "y": lua_number(l.at.y),
            "material": lua_string(&l.material),
            "automesh": u8::from(l.automesh),
            "mesh_size": lua_number(l.mesh_size),
            "magdir": lua_number(l.magnetization_deg),
            "group": l.group,
        })
    }).collect();

    let contour = doc.contour.as_ref().map(|c| {
        serde_json::json!({
            "x1": lua_number(c.start.x),
            "y1": lua_number(c.start.y),
            "x2": lua_number(c.end.x),
            "y2": lua_number(c.end.y),
            "samples": c.samples,
            "field_file": lua_string(&c.field_file.to_string_lossy()),
        })
    });

    let output = template.render(context! {
        header_comment => "Generated by halbach-femm from a MagnetConfig",
        timestamp => chrono::Utc::now().to_rfc3339(),
        units => doc.length_unit.femm_name(),
        cell_pitch => lua_number(doc.cell_pitch),
        lattice_length => lua_number(doc.lattice_length),
        precision => lua_number(emit.precision),
        depth => lua_number(doc.depth),
        min_angle => lua_number(doc.min_angle),
        materials => materials,
        boundaries => boundaries,
        nodes => nodes,
        segments => segments,
        boundary_segments => boundary_segments,
        labels => labels,
        zoom => window(&doc.zoom),
        fem_file => lua_string(&doc.fem_file),
        contour => contour,
    })?;

    Ok(output)
}

fn window((lo, hi): &(Vector2<f64>, Vector2<f64>)) -> serde_json::Value {
    serde_json::json!({
        "x1": lua_number(lo.x),
        "y1": lua_number(lo.y),
        "x2": lua_number(hi.x),
        "y2": lua_number(hi.y),
    })
}

/// Shortest decimal that round-trips; Lua reads both `1e-08` and `220.5`
fn lua_number(value: f64) -> String {
    if value == 0.0 {
        // Avoid emitting "-0"
        return "0".to_string();
    }
    let text = format!("{value:?}");
    text.strip_suffix(".0").map(str::to_string).unwrap_or(text)
}

/// Double-quoted Lua string literal
fn lua_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
