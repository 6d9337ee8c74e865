//! Domain code tables of the national NFS-e layout.
//!
//! Every table maps small numeric codes to the canonical Portuguese text printed
//! on the DANFSe. Lookups never fail: non-numeric or unknown codes resolve to
//! [`FALLBACK`].

/// Marker printed for absent or unknown values.
pub const FALLBACK: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeTable {
    /// `tribISSQN`
    IssqnTaxation,
    /// `tpImunidade`
    ImmunityType,
    /// `exigSusp/tpSusp`
    SuspensionType,
    /// `tpRetISSQN`
    IssqnWithholding,
    /// `tpRetPisCofins`
    PisCofinsWithholding,
    /// `regEspTrib`
    SpecialRegime,
    /// `opSimpNac`
    SimplesNacionalOption,
    /// `regApTribSN`
    SimplesNacionalRegime,
}

const ISSQN_TAXATION: &[(u32, &str)] = &[
    (1, "Operação Tributável"),
    (2, "Imunidade"),
    (3, "Exportação de Serviço"),
    (4, "Não Incidência"),
];

const IMMUNITY_TYPE: &[(u32, &str)] = &[
    (0, "Imunidade (tipo não informado na nota de origem)"),
    (
        1,
        "Patrimônio, renda ou serviços, uns dos outros (CF88, Art 150, VI, a)",
    ),
    (2, "Templos de qualquer culto (CF88, Art 150, VI, b)"),
    (
        3,
        "Patrimônio, renda ou serviços dos partidos políticos, inclusive suas fundações, das entidades sindicais dos trabalhadores, das instituições de educação e de assistência social, sem fins lucrativos (CF88, Art 150, VI, c)",
    ),
    (
        4,
        "Livros, jornais, periódicos e o papel destinado a sua impressão (CF88, Art 150, VI, d)",
    ),
    (
        5,
        "Fonogramas e videofonogramas musicais produzidos no Brasil (CF88, Art 150, VI, e)",
    ),
];

const SUSPENSION_TYPE: &[(u32, &str)] = &[
    (1, "Exigibilidade Suspensa por Decisão Judicial"),
    (2, "Exigibilidade Suspensa por Processo Administrativo"),
];

const ISSQN_WITHHOLDING: &[(u32, &str)] = &[
    (1, "Não Retido"),
    (2, "Retido pelo Tomador"),
    (3, "Retido pelo Intermediário"),
];

const PIS_COFINS_WITHHOLDING: &[(u32, &str)] = &[
    (1, "PIS/COFINS Retidos"),
    (2, "PIS/COFINS Não Retidos"),
    (3, "PIS Retido/COFINS Não Retido"),
    (4, "PIS Não Retido/COFINS Retido"),
];

const SPECIAL_REGIME: &[(u32, &str)] = &[
    (0, "Nenhum"),
    (1, "Ato Cooperado (Cooperativa)"),
    (2, "Estimativa"),
    (3, "Microempresa Municipal"),
    (4, "Notário ou Registrador"),
    (5, "Profissional Autônomo"),
    (6, "Sociedade de Profissionais"),
];

const SIMPLES_NACIONAL_OPTION: &[(u32, &str)] = &[
    (1, "Não Optante"),
    (2, "Optante - Microempreendedor Individual (MEI)"),
    (
        3,
        "Optante - Microempresa ou Empresa de Pequeno Porte (ME/EPP)",
    ),
];

const SIMPLES_NACIONAL_REGIME: &[(u32, &str)] = &[
    (
        1,
        "Regime de apuração dos tributos federais e municipal pelo Simples Nacional",
    ),
    (
        2,
        "Regime de apuração dos tributos federais pelo SN e o ISSQN pela NFS-e conforme respectiva legislação municipal do tributo",
    ),
    (
        3,
        "Regime de apuração dos tributos federais e municipal pela NFS-e conforme respectivas legislações federal e municipal de cada tributo",
    ),
];

impl CodeTable {
    pub const ALL: [CodeTable; 8] = [
        CodeTable::IssqnTaxation,
        CodeTable::ImmunityType,
        CodeTable::SuspensionType,
        CodeTable::IssqnWithholding,
        CodeTable::PisCofinsWithholding,
        CodeTable::SpecialRegime,
        CodeTable::SimplesNacionalOption,
        CodeTable::SimplesNacionalRegime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CodeTable::IssqnTaxation => "tribISSQN",
            CodeTable::ImmunityType => "tpImunidade",
            CodeTable::SuspensionType => "tpSusp",
            CodeTable::IssqnWithholding => "tpRetISSQN",
            CodeTable::PisCofinsWithholding => "tpRetPisCofins",
            CodeTable::SpecialRegime => "regEspTrib",
            CodeTable::SimplesNacionalOption => "opSimpNac",
            CodeTable::SimplesNacionalRegime => "regApTribSN",
        }
    }

    /// Looks a table up by its XML element name.
    pub fn from_name(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        CodeTable::ALL
            .into_iter()
            .find(|table| table.name().eq_ignore_ascii_case(raw))
    }

    pub fn entries(&self) -> &'static [(u32, &'static str)] {
        match self {
            CodeTable::IssqnTaxation => ISSQN_TAXATION,
            CodeTable::ImmunityType => IMMUNITY_TYPE,
            CodeTable::SuspensionType => SUSPENSION_TYPE,
            CodeTable::IssqnWithholding => ISSQN_WITHHOLDING,
            CodeTable::PisCofinsWithholding => PIS_COFINS_WITHHOLDING,
            CodeTable::SpecialRegime => SPECIAL_REGIME,
            CodeTable::SimplesNacionalOption => SIMPLES_NACIONAL_OPTION,
            CodeTable::SimplesNacionalRegime => SIMPLES_NACIONAL_REGIME,
        }
    }

    pub fn resolve(&self, code: &str) -> &'static str {
        let Some(numeric) = parse_code(code) else {
            if !code.trim().is_empty() {
                log::debug!("non-numeric {} code {:?}", self.name(), code);
            }
            return FALLBACK;
        };
        match self.entries().iter().find(|(key, _)| *key == numeric) {
            Some((_, text)) => text,
            None => {
                log::debug!("unmapped {} code {}", self.name(), numeric);
                FALLBACK
            }
        }
    }
}

/// Resolves `code` against `table`, returning [`FALLBACK`] when unmapped.
pub fn resolve(table: CodeTable, code: &str) -> &'static str {
    table.resolve(code)
}

/// Parses a numeric-shaped code. Leading zeros are accepted (`"01"` is 1).
pub(crate) fn parse_code(code: &str) -> Option<u32> {
    let code = code.trim();
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}
