//! Language catalog and instruction templates.
//!
//! The catalog is a static, read-only table. Callers select a language by
//! its identifier only.

use serde::Serialize;

use crate::error::{Result, TranslatorError};

/// Identifier used when a request does not name a language.
pub const DEFAULT_LANGUAGE: &str = "maya";

/// Display metadata for one supported language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfig {
    pub id: &'static str,
    pub name: &'static str,
    pub name_native: &'static str,
    pub flag: &'static str,
    pub speakers: &'static str,
    pub regions: &'static [&'static str],
    pub family: &'static str,
    pub iso639: &'static str,
    pub cultural_note: &'static str,
}

static LANGUAGES: [LanguageConfig; 8] = [
    LanguageConfig {
        id: "maya",
        name: "Maya Yucateco",
        name_native: "Maaya t'aan",
        flag: "🇲🇽",
        speakers: "800,000",
        regions: &["Yucatán", "Quintana Roo", "Campeche"],
        family: "Maya",
        iso639: "yua",
        cultural_note: "Lengua ancestral de la civilización maya, con rica tradición literaria y jeroglífica.",
    },
    LanguageConfig {
        id: "nahuatl",
        name: "Náhuatl",
        name_native: "Nāhuatl",
        flag: "🇲🇽",
        speakers: "1,700,000",
        regions: &["Puebla", "Veracruz", "Hidalgo", "Guerrero", "Estado de México"],
        family: "Uto-azteca",
        iso639: "nah",
        cultural_note: "Lengua del imperio azteca, con gran influencia en el español mexicano.",
    },
    LanguageConfig {
        id: "zapoteco",
        name: "Zapoteco",
        name_native: "Diidxazá",
        flag: "🇲🇽",
        speakers: "500,000",
        regions: &["Oaxaca"],
        family: "Otomangue",
        iso639: "zap",
        cultural_note: "Una de las lenguas más antiguas de Mesoamérica, con sistema de escritura prehispánico.",
    },
    LanguageConfig {
        id: "mixteco",
        name: "Mixteco",
        name_native: "Tu'un savi",
        flag: "🇲🇽",
        speakers: "500,000",
        regions: &["Oaxaca", "Guerrero", "Puebla"],
        family: "Otomangue",
        iso639: "mix",
        cultural_note: "Lengua tonal con códices pictográficos únicos en Mesoamérica.",
    },
    LanguageConfig {
        id: "otomi",
        name: "Otomí",
        name_native: "Hñähñu",
        flag: "🇲🇽",
        speakers: "290,000",
        regions: &["Hidalgo", "Estado de México", "Querétaro"],
        family: "Otopame",
        iso639: "oto",
        cultural_note: "Lengua tonal con importancia ritual en ceremonias tradicionales.",
    },
    LanguageConfig {
        id: "tzeltal",
        name: "Tzeltal",
        name_native: "K'op o winik atel",
        flag: "🇲🇽",
        speakers: "470,000",
        regions: &["Chiapas"],
        family: "Maya",
        iso639: "tzh",
        cultural_note: "Lengua maya de los Altos de Chiapas, fundamental en la identidad tzeltal.",
    },
    LanguageConfig {
        id: "totonaco",
        name: "Totonaco",
        name_native: "Tachihuiin",
        flag: "🇲🇽",
        speakers: "250,000",
        regions: &["Veracruz", "Puebla"],
        family: "Totonacana",
        iso639: "top",
        cultural_note: "Pueblo conocido por la Danza de los Voladores, patrimonio cultural.",
    },
    LanguageConfig {
        id: "mazateco",
        name: "Mazateco",
        name_native: "Ha shuta enima",
        flag: "🇲🇽",
        speakers: "220,000",
        regions: &["Oaxaca"],
        family: "Otomangue",
        iso639: "maz",
        cultural_note: "Famoso por su lenguaje silbado, único sistema de comunicación tonal.",
    },
];

/// Government-procedure glossary appended when domain context is requested.
/// `{name}` is replaced with the language's display name.
const DOMAIN_CONTEXT_BLOCK: &str = "

## Contexto Especial: Trámites Gubernamentales
El usuario puede preguntar sobre trámites del gobierno municipal. Traduce estos conceptos:

### Términos Clave:
- **Trámite** → Proceso o diligencia administrativa
- **Requisitos** → Documentos o condiciones necesarias
- **Licencia** → Permiso oficial
- **Acta** → Documento oficial certificado
- **Comprobante** → Documento que verifica algo
- **Costo** → Precio o pago requerido
- **Duración** → Tiempo que tarda el proceso

### Trámites Comunes:
1. Licencia de Conducir
2. Acta de Nacimiento
3. Permiso de Construcción
4. Pago de Predial (impuesto sobre propiedad)
5. Registro de Negocio
6. CURP (identificación nacional)

Cuando el usuario pregunte sobre un trámite:
1. Confirma que entendiste la pregunta
2. Explica el trámite en {name}
3. Si hay términos técnicos sin traducción directa, explícalos con ejemplos culturales
";

/// All languages in catalog order.
pub fn list() -> &'static [LanguageConfig] {
    &LANGUAGES
}

/// Look up a language by identifier.
pub fn resolve(id: &str) -> Option<&'static LanguageConfig> {
    LANGUAGES.iter().find(|lang| lang.id == id)
}

pub fn is_valid(id: &str) -> bool {
    resolve(id).is_some()
}

/// Look up a language, failing with [`TranslatorError::InvalidLanguage`].
pub fn require(id: &str) -> Result<&'static LanguageConfig> {
    resolve(id).ok_or_else(|| TranslatorError::InvalidLanguage(id.to_string()))
}

/// Build the system instructions for translating into `id`.
///
/// With `include_domain_context` the government-procedure block is appended
/// after the base template, so the base instructions are always a prefix of
/// the extended ones.
pub fn build_instructions(id: &str, include_domain_context: bool) -> Result<String> {
    let lang = require(id)?;
    let mut prompt = base_instructions(lang);
    if include_domain_context {
        prompt.push_str(&DOMAIN_CONTEXT_BLOCK.replace("{name}", lang.name));
    }
    Ok(prompt)
}

fn base_instructions(lang: &LanguageConfig) -> String {
    let name = lang.name;
    format!(
        "# Identidad del Agente
Eres un intérprete experto especializado en {name} ({native}), una lengua indígena de México.

## Tu Misión
- Traducir del español a {name} con precisión cultural y lingüística
- Adaptar términos modernos y gubernamentales al contexto cultural indígena
- Responder en audio natural y comprensible
- Preservar el respeto y dignidad de la lengua ancestral

## Características de {name}
- Familia lingüística: {family}
- Hablantes: Aproximadamente {speakers} personas
- Regiones: {regions}
- {note}

## Principios de Traducción
1. **Precisión Cultural**: Adapta conceptos modernos al mundo conceptual indígena
2. **Respeto Lingüístico**: Usa las formas apropiadas y honoríficos cuando sea necesario
3. **Claridad**: Prioriza la comprensión sobre la traducción literal
4. **Naturalidad**: Habla como lo haría un hablante nativo

## Formato de Respuesta
- Responde SIEMPRE en {name}
- Mantén un tono natural y conversacional
- Si no existe un término directo, explica el concepto en la lengua indígena
",
        native = lang.name_native,
        family = lang.family,
        speakers = lang.speakers,
        regions = lang.regions.join(", "),
        note = lang.cultural_note,
    )
}
