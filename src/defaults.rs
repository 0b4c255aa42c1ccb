//! Built-in patch content for the medchem drug card.
//!
//! These blocks are versioned with the crate: changing one changes what a
//! fresh run inserts, but never re-patches a file that already carries the
//! marker.

use serde_json::{Map, Value, json};

/// Backup directory, relative to the project root.
pub const BACKUP_DIR: &str = "_backups";

/// Top-level key holding the record list.
pub const COLLECTION_KEY: &str = "drugs";

/// Data file, relative to the project root.
pub const DATA_PATH: &str = "medchem/data/drugs.json";

/// Function whose body receives the script block.
pub const FUNCTION_NAME: &str = "loadDrug";

/// Fields appended to the drug card after the target line.
pub const MARKUP_BLOCK: &str = r#"<hr>

<p><b>PK / ADMET:</b> <span id="pk_admet"></span></p>
<p><b>ADMET Flags:</b> <span id="admet_flags"></span></p>

<p><b>Metabolism:</b> <span id="metabolism"></span></p>
<p><b>CYP Enzymes:</b> <span id="cyp_enzymes"></span></p>
<p><b>Transporters:</b> <span id="transporters"></span></p>

<p><b>Half-life:</b> <span id="half_life"></span></p>
<p><b>Bioavailability:</b> <span id="bioavailability"></span></p>
<p><b>BBB Penetration:</b> <span id="bbb"></span></p>
<p><b>Elimination:</b> <span id="elimination"></span></p>

<p><b>Drug–Drug Interactions (DDIs):</b> <span id="ddis"></span></p>

<p><b>Contraindications:</b> <span id="contraindications"></span></p>
<p><b>Boxed Warnings:</b> <span id="boxed_warnings"></span></p>

<p><b>PhysChem:</b> <span id="physchem"></span></p>
<p><b>Clinical Pearls:</b> <span id="clinical_pearls"></span></p>"#;

/// Present in the markup once patched.
pub const MARKUP_MARKER: &str = r#"id="pk_admet""#;

/// Markup file, relative to the project root.
pub const MARKUP_PATH: &str = "medchem/index.html";

/// The drug card panel heading, used when there is no target line.
pub const PANEL_HEADER_PATTERN: &str = r#"(?is)<section[^>]*class="panel right"[^>]*>.*?<h2>.*?</h2>"#;

/// The feedback reset inside `loadDrug`; the script block goes right above it.
pub const PREFERRED_ANCHOR: &str = r"\n\s*attempts\s*=\s*0\s*;";

/// Statements that fill the new card fields from the current record.
pub const SCRIPT_BLOCK: &str = r#"  // ===== Expanded MedChem Fields =====
  const joinOrBlank = (val, sep = "; ") =>
    Array.isArray(val) ? val.join(sep) : (val || "");

  const setText = (id, text) => {
    const el = document.getElementById(id);
    if (el) el.textContent = text ?? "";
  };

  setText("pk_admet", currentDrug.pk_admet || "");
  setText("admet_flags", joinOrBlank(currentDrug.admet_flags));

  setText("metabolism", currentDrug.metabolism || "");
  setText("cyp_enzymes", joinOrBlank(currentDrug.cyp_enzymes));
  setText("transporters", joinOrBlank(currentDrug.transporters));

  setText("half_life", currentDrug.half_life || "");
  setText("bioavailability", currentDrug.bioavailability || "");
  setText("bbb", currentDrug.bbb || "");
  setText("elimination", currentDrug.elimination || "");

  setText("ddis", joinOrBlank(currentDrug.ddis));
  setText("contraindications", joinOrBlank(currentDrug.contraindications));
  setText("boxed_warnings", joinOrBlank(currentDrug.boxed_warnings));

  const p = currentDrug.physchem || {};
  const physchemLine = [
    p.mw ? `MW: ${p.mw}` : "",
    p.logp ? `logP: ${p.logp}` : "",
    p.tpsa ? `tPSA: ${p.tpsa}` : "",
    p.hbd ? `HBD: ${p.hbd}` : "",
    p.hba ? `HBA: ${p.hba}` : "",
    p.pka ? `pKa: ${p.pka}` : ""
  ].filter(Boolean).join(" | ");

  setText("physchem", physchemLine);
  setText("clinical_pearls", joinOrBlank(currentDrug.clinical_pearls, " • "));
  // ===== End Expanded MedChem Fields ====="#;

/// Present in the script once patched.
pub const SCRIPT_MARKER: &str = "Expanded MedChem Fields";

/// Script file, relative to the project root.
pub const SCRIPT_PATH: &str = "medchem/app.js";

/// The `Target:` line of the drug card.
pub const TARGET_LINE_PATTERN: &str = r"(?is)<p>\s*<b>Target:.*?</p>";

/// Fields every drug record must carry, in the order they are appended.
pub fn default_fields() -> Map<String, Value> {
    let fields = json!({
        "pk_admet": "",
        "admet_flags": [],
        "cyp_enzymes": [],
        "transporters": [],
        "half_life": "",
        "bioavailability": "",
        "bbb": "",
        "elimination": "",
        "contraindications": [],
        "boxed_warnings": [],
        "physchem": {"mw": "", "logp": "", "tpsa": "", "hbd": "", "hba": "", "pka": ""},
        "clinical_pearls": []
    });
    return match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
}
