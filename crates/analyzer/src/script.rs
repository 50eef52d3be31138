//! Static registry mapping the node's script type strings onto [`ScriptClass`].
//!
//! Unknown strings map to [`ScriptClass::Other`]; classification never fails.

use bitlens_core::ScriptClass;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Returns the class for a `scriptPubKey.type` string.
pub fn classify(script_type: &str) -> ScriptClass {
    KNOWN_TYPES
        .get(script_type)
        .copied()
        .unwrap_or(ScriptClass::Other)
}

/// Short human label used by the text reporter.
pub fn label(class: ScriptClass) -> &'static str {
    match class {
        ScriptClass::P2pk => "P2PK",
        ScriptClass::P2pkh => "P2PKH",
        ScriptClass::P2sh => "P2SH",
        ScriptClass::Multisig => "bare multisig",
        ScriptClass::P2wpkh => "P2WPKH",
        ScriptClass::P2wsh => "P2WSH",
        ScriptClass::P2tr => "P2TR",
        ScriptClass::NullData => "OP_RETURN",
        ScriptClass::Other => "other",
    }
}

static KNOWN_TYPES: LazyLock<HashMap<&'static str, ScriptClass>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // ── Legacy ───────────────────────────────────────────────
    m.insert("pubkey", ScriptClass::P2pk);
    m.insert("pubkeyhash", ScriptClass::P2pkh);
    m.insert("scripthash", ScriptClass::P2sh);
    m.insert("multisig", ScriptClass::Multisig);

    // ── Segwit ───────────────────────────────────────────────
    m.insert("witness_v0_keyhash", ScriptClass::P2wpkh);
    m.insert("witness_v0_scripthash", ScriptClass::P2wsh);
    m.insert("witness_v1_taproot", ScriptClass::P2tr);

    // ── Data carrier ─────────────────────────────────────────
    m.insert("nulldata", ScriptClass::NullData);

    m
});
