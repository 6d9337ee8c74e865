use crate::assets::ImageAsset;
use crate::canvas::Align;
use crate::codes::FALLBACK;
use crate::font::FontFace;
use crate::layout::{Cursor, Field, LayoutContext, row, section_title};
use crate::model::DocumentData;
use crate::types::{Pt, Rect};

pub const QR_URL_PREFIX: &str = "https://www.nfse.gov.br/ConsultaPublica?tpc=1&chave=";

pub const QR_MESSAGE: &str = "A autenticidade desta NFS-e pode ser verificada pela leitura deste \
código QR ou pela consulta da chave de acesso no portal nacional da NFS-e";

pub type SectionFn = fn(&mut LayoutContext<'_>, &DocumentData, Cursor) -> Cursor;

/// Document order. Not configurable.
pub const SECTIONS: &[(&str, SectionFn)] = &[
    ("header", header),
    ("access_key", access_key),
    ("identification", identification),
    ("issuer", issuer),
    ("payer", payer),
    ("intermediary", intermediary),
    ("service", service),
    ("municipal_taxation", municipal_taxation),
    ("federal_taxation", federal_taxation),
    ("totals", totals),
    ("tax_totals", tax_totals),
    ("notes", notes),
];

pub fn qr_payload(access_key: &str) -> String {
    format!("{QR_URL_PREFIX}{access_key}")
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { FALLBACK } else { value }
}

fn header_height() -> Pt {
    Pt::from_mm(15.0)
}

/// Fits `asset` inside `slot`, centred, keeping its aspect ratio.
fn place_image(ctx: &mut LayoutContext<'_>, asset: &ImageAsset, slot: Rect) {
    let mut width = slot.width;
    let mut height = asset.scaled_height(width);
    if height > slot.height && asset.height > 0 {
        height = slot.height;
        width = slot.height.mul_ratio(asset.width as i32, asset.height as i32);
    }
    let x = slot.x + (slot.width - width).max(Pt::ZERO) / 2;
    let y = slot.y + (slot.height - height).max(Pt::ZERO) / 2;
    ctx.canvas.image(x, y, width, height, asset);
}

/// Logo on the left, document title in the middle, issuing authority on the
/// right. Image slots are fixed, so text never moves when an image is absent.
pub fn header(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let grid = ctx.grid;
    let assets = ctx.assets;
    let top = cursor.y + Pt::from_mm(1.0);
    let slot_height = Pt::from_mm(13.0);

    let logo_slot = Rect {
        x: grid.left() + grid.padding,
        y: top,
        width: Pt::from_mm(33.0),
        height: slot_height,
    };
    if let Some(logo) = assets.logo.as_ref() {
        place_image(ctx, logo, logo_slot);
    }

    let title_x = logo_slot.right() + grid.padding;
    let title_width = grid.column_x(2) - title_x;
    ctx.canvas.set_font(FontFace::Bold, Pt::from_f32(9.0));
    let line = Pt::from_mm(4.5);
    ctx.canvas
        .cell(title_x, top + Pt::from_mm(1.5), title_width, line, "DANFSe v1.0", Align::Center);
    ctx.canvas.cell(
        title_x,
        top + Pt::from_mm(1.5) + line,
        title_width,
        line,
        "Documento Auxiliar da NFS-e",
        Align::Center,
    );

    let frame = grid.frame();
    let crest_slot = Rect {
        x: frame.right() - grid.padding - slot_height,
        y: top,
        width: slot_height,
        height: slot_height,
    };
    if let Some(crest) = assets.crest.as_ref() {
        place_image(ctx, crest, crest_slot);
    }

    let authority_x = grid.column_x(2);
    let authority_width = crest_slot.x - grid.padding - authority_x;
    ctx.canvas.set_font(FontFace::Bold, Pt::from_f32(8.0));
    let name = ctx.fit_line(&data.authority.name, authority_width);
    let name_height = Pt::from_mm(3.5);
    ctx.canvas
        .cell(authority_x, top, authority_width, name_height, &name, Align::Right);

    ctx.canvas.set_font(FontFace::Regular, Pt::from_f32(6.0));
    let detail_height = Pt::from_mm(2.6);
    let mut y = top + name_height;
    for detail in data.authority.lines() {
        let detail = ctx.fit_line(detail, authority_width);
        ctx.canvas
            .cell(authority_x, y, authority_width, detail_height, &detail, Align::Right);
        y += detail_height;
    }

    cursor.advance(header_height()).lowest(Cursor::at(y))
}

pub fn access_key(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    row(
        ctx,
        cursor,
        &[Field::line(0, "Chave de Acesso da NFS-e", or_dash(&data.identification.access_key)).span(4)],
    )
}

/// Two rows of numbers and dates in the first three columns; the QR symbol
/// and its caption sit in the fourth, anchored at the block top.
pub fn identification(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let id = &data.identification;
    let qr_size = Pt::from_mm(20.0);
    let cursor = ctx.ensure_room(cursor, qr_size);
    let text_end = row(
        ctx,
        cursor,
        &[
            Field::line(0, "Número da NFS-e", or_dash(&id.number)),
            Field::line(1, "Competência da NFS-e", or_dash(&id.competence)),
            Field::line(2, "Data e Hora da emissão da NFS-e", or_dash(&id.processed_at)),
        ],
    );
    let text_end = row(
        ctx,
        text_end,
        &[
            Field::line(0, "Número da DPS", or_dash(&id.dps_number)),
            Field::line(1, "Série da DPS", or_dash(&id.dps_series)),
            Field::line(2, "Data e Hora da emissão da DPS", or_dash(&id.emitted_at)),
        ],
    );

    let (x, width) = ctx.grid.cell(3, 1);
    if let Err(err) = ctx.canvas.qr_code(x, cursor.y, qr_size, &qr_payload(&id.access_key)) {
        log::warn!("QR code omitted: {err}");
        ctx.stats.assets_missing += 1;
    }
    let qr_end = Cursor::at(cursor.y + qr_size);

    let message_x = x + qr_size + Pt::from_mm(1.0);
    let message_width = (x + width - message_x).max(Pt::ZERO);
    ctx.canvas.set_font(FontFace::Regular, Pt::from_f32(5.5));
    let message_end = ctx.canvas.multi_cell(
        message_x,
        cursor.y + Pt::from_mm(1.0),
        message_width,
        Pt::from_mm(2.3),
        QR_MESSAGE,
        Align::Left,
    );

    text_end.lowest(qr_end).lowest(Cursor::at(message_end))
}

struct Party<'a> {
    title: &'a str,
    role: &'a str,
    tax_id: &'a str,
    municipal_registration: &'a str,
    phone: &'a str,
    name: &'a str,
    email: &'a str,
    address: String,
    municipality: &'a str,
    postal_code: &'a str,
}

fn party(ctx: &mut LayoutContext<'_>, cursor: Cursor, party: &Party<'_>) -> Cursor {
    let cursor = section_title(ctx, cursor, party.title);
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::line(0, party.role, ""),
            Field::line(1, "CNPJ / CPF / NIF", or_dash(party.tax_id)),
            Field::line(2, "Inscrição Municipal", or_dash(party.municipal_registration)),
            Field::line(3, "Telefone", or_dash(party.phone)),
        ],
    );
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::wrapped(0, "Nome / Nome Empresarial", or_dash(party.name)).span(2),
            Field::line(2, "E-mail", or_dash(party.email)).span(2),
        ],
    );
    row(
        ctx,
        cursor,
        &[
            Field::wrapped(0, "Endereço", or_dash(&party.address)).span(2),
            Field::line(2, "Município", or_dash(party.municipality)),
            Field::line(3, "CEP", or_dash(party.postal_code)),
        ],
    )
}

pub fn issuer(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let issuer = &data.issuer;
    let cursor = party(
        ctx,
        cursor,
        &Party {
            title: "EMITENTE DA NFS-e",
            role: "Prestador do Serviço",
            tax_id: &issuer.tax_id,
            municipal_registration: &issuer.municipal_registration,
            phone: &issuer.phone,
            name: &issuer.name,
            email: &issuer.email,
            address: issuer.address.display_line(),
            municipality: &issuer.municipality,
            postal_code: &issuer.address.postal_code,
        },
    );
    row(
        ctx,
        cursor,
        &[
            Field::wrapped(
                0,
                "Simples Nacional na Data de Competência",
                or_dash(&issuer.simples_nacional),
            )
            .span(2),
            Field::wrapped(
                2,
                "Regime de Apuração Tributária pelo SN",
                or_dash(&issuer.simples_nacional_regime),
            )
            .span(2),
        ],
    )
}

pub fn payer(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let payer = &data.payer;
    party(
        ctx,
        cursor,
        &Party {
            title: "TOMADOR DO SERVIÇO",
            role: "",
            tax_id: &payer.tax_id,
            municipal_registration: &payer.municipal_registration,
            phone: &payer.phone,
            name: &payer.name,
            email: &payer.email,
            address: payer.address.display_line(),
            municipality: &payer.municipality,
            postal_code: &payer.address.postal_code,
        },
    )
}

/// The national layout carries no intermediary data; the block is a fixed
/// notice.
pub fn intermediary(ctx: &mut LayoutContext<'_>, _data: &DocumentData, cursor: Cursor) -> Cursor {
    section_title(ctx, cursor, "INTERMEDIÁRIO DO SERVIÇO NÃO IDENTIFICADO NA NFS-e")
}

pub fn service(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let service = &data.service;
    let national = service.national_classification();
    let municipal = service.municipal_classification();
    let cursor = section_title(ctx, cursor, "SERVIÇO PRESTADO");
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::clamped(0, "Código de Tributação Nacional", &national, 2),
            Field::clamped(1, "Código de Tributação Municipal", &municipal, 2),
            Field::line(2, "Local da Prestação", or_dash(&data.identification.rendering_locality)),
            Field::line(3, "País da Prestação", or_dash(&service.rendering_country)),
        ],
    );
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::line(0, "Código NBS", or_dash(&service.nbs_code)),
            Field::line(1, "Código Interno do Contribuinte", or_dash(&service.supplementary_code)),
        ],
    );
    row(
        ctx,
        cursor,
        &[Field::wrapped(0, "Descrição do Serviço", or_dash(&service.description)).span(4)],
    )
}

pub fn municipal_taxation(
    ctx: &mut LayoutContext<'_>,
    data: &DocumentData,
    cursor: Cursor,
) -> Cursor {
    let taxation = &data.taxation;
    let values = &data.values;
    let cursor = section_title(ctx, cursor, "TRIBUTAÇÃO MUNICIPAL");
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::line(0, "Tributação do ISSQN", or_dash(&taxation.issqn_taxation)),
            Field::line(1, "País Resultado da Prestação do Serviço", or_dash(&taxation.result_country)),
            Field::line(2, "Município de Incidência do ISSQN", or_dash(&data.identification.taxation_locality)),
            Field::wrapped(3, "Regime Especial de Tributação", or_dash(&taxation.special_regime)),
        ],
    );
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::wrapped(0, "Tipo de Imunidade", or_dash(&taxation.immunity_type)),
            Field::wrapped(1, "Suspensão da Exigibilidade do ISSQN", or_dash(&taxation.suspension_type)),
            Field::line(2, "Número Processo Suspensão", or_dash(&taxation.suspension_process)),
            Field::line(3, "Benefício Municipal", or_dash(&taxation.benefit_number)),
        ],
    );
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::line(0, "Valor do Serviço", &values.service_value),
            Field::line(1, "Desconto Incondicionado", &values.unconditional_discount),
            Field::line(2, "Total Deduções/Reduções", &values.deductions),
            Field::line(3, "Cálculo do BM", &values.benefit_reduction),
        ],
    );
    row(
        ctx,
        cursor,
        &[
            Field::line(0, "BC ISSQN", &values.issqn_base),
            Field::line(1, "Alíquota Aplicada", &taxation.applied_rate),
            Field::line(2, "Retenção do ISSQN", or_dash(&taxation.issqn_withholding)),
            Field::line(3, "ISSQN Apurado", &values.issqn_amount),
        ],
    )
}

pub fn federal_taxation(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let values = &data.values;
    let cursor = section_title(ctx, cursor, "TRIBUTAÇÃO FEDERAL");
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::line(0, "IRRF", &values.irrf_withheld),
            Field::line(1, "Contribuição Previdenciária - Retida", &values.cp_withheld),
            Field::line(2, "CSLL", &values.csll_withheld),
        ],
    );
    row(
        ctx,
        cursor,
        &[
            Field::line(0, "PIS", &values.pis_amount),
            Field::line(1, "COFINS", &values.cofins_amount),
            Field::wrapped(2, "Retenção do PIS/COFINS", or_dash(&data.taxation.pis_cofins_withholding)),
            Field::line(3, "TOTAL TRIBUTAÇÃO FEDERAL", &values.federal_total),
        ],
    )
}

pub fn totals(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let values = &data.values;
    let cursor = section_title(ctx, cursor, "VALOR TOTAL DA NFS-E");
    let cursor = row(
        ctx,
        cursor,
        &[
            Field::line(0, "Valor do Serviço", &values.service_value),
            Field::line(1, "Desconto Condicionado", &values.conditional_discount),
            Field::line(2, "Desconto Incondicionado", &values.unconditional_discount),
            Field::line(3, "ISSQN Retido", &values.issqn_withheld),
        ],
    );
    row(
        ctx,
        cursor,
        &[
            Field::line(0, "IRRF, CP, CSLL - Retidos", &values.federal_withheld),
            Field::line(1, "PIS/COFINS Retidos", &values.pis_cofins_withheld),
            Field::line(3, "Valor Líquido da NFS-e", &values.net_value),
        ],
    )
}

pub fn tax_totals(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let totals = &data.tax_totals;
    let cursor = section_title(ctx, cursor, "TOTAIS APROXIMADOS DOS TRIBUTOS");
    row(
        ctx,
        cursor,
        &[
            Field::line(0, "Federais", &totals.federal),
            Field::line(1, "Estaduais", &totals.state),
            Field::line(2, "Municipais", &totals.municipal),
            Field::line(3, "Simples Nacional", &totals.simples_nacional),
        ],
    )
}

pub fn notes(ctx: &mut LayoutContext<'_>, data: &DocumentData, cursor: Cursor) -> Cursor {
    let cursor = section_title(ctx, cursor, "INFORMAÇÕES COMPLEMENTARES");
    row(
        ctx,
        cursor,
        &[Field::wrapped(0, "", or_dash(&data.service.notes)).span(4)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::png_bytes;
    use crate::canvas::{Canvas, Command, Document};
    use crate::grid::GridSpec;
    use crate::layout::HeaderAssets;
    use crate::model::Authority;
    use crate::types::Size;

    fn render(
        section: SectionFn,
        data: &DocumentData,
        assets: &HeaderAssets,
    ) -> (Cursor, Cursor, Document) {
        let grid = GridSpec::danfse();
        let mut canvas = Canvas::new(Size::a4());
        let start = Cursor::at(grid.frame().y);
        let end = {
            let mut ctx = LayoutContext::new(&mut canvas, &grid, assets);
            section(&mut ctx, data, start)
        };
        (start, end, canvas.finish())
    }

    fn strings(doc: &Document) -> Vec<(Pt, Pt, String)> {
        doc.pages[0]
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { x, baseline, text } => Some((*x, *baseline, text.clone())),
                _ => None,
            })
            .collect()
    }

    fn sample() -> DocumentData {
        crate::extract::extract(include_str!("../tests/fixtures/nfse.xml")).unwrap()
    }

    #[test]
    fn every_section_advances_the_cursor() {
        let data = sample();
        for (name, section) in SECTIONS {
            let (start, end, _) = render(*section, &data, &HeaderAssets::default());
            assert!(end > start, "{name} did not advance");
        }
    }

    #[test]
    fn header_text_ignores_missing_images() {
        let mut data = DocumentData::default();
        data.authority = Authority {
            name: "Prefeitura Municipal de Criciúma".into(),
            department: Some("Secretaria Municipal da Fazenda".into()),
            ..Authority::default()
        };
        let image = ImageAsset::decode(&png_bytes(8, 4, 255)).unwrap();
        let with_images = HeaderAssets {
            logo: Some(image.clone()),
            crest: Some(image),
            missing: 0,
        };

        let (_, end_without, bare) = render(header, &data, &HeaderAssets::default());
        let (_, end_with, decorated) = render(header, &data, &with_images);
        assert_eq!(strings(&bare), strings(&decorated));
        assert_eq!(end_without, end_with);
        assert_eq!(decorated.images.len(), 1);
        assert_eq!(
            decorated.pages[0]
                .commands
                .iter()
                .filter(|cmd| matches!(cmd, Command::DrawImage { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn qr_is_anchored_at_block_top_in_last_column() {
        let data = sample();
        let grid = GridSpec::danfse();
        let (start, end, doc) = render(identification, &data, &HeaderAssets::default());
        let first_module = doc.pages[0]
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::FillRect(rect) => Some(*rect),
                _ => None,
            })
            .unwrap();
        assert!(first_module.x >= grid.column_x(3));
        assert!(first_module.y >= start.y);
        assert!(first_module.y < start.y + Pt::from_mm(2.0));
        assert!(end.y >= start.y + Pt::from_mm(20.0));
        assert_eq!(qr_payload("123"), format!("{QR_URL_PREFIX}123"));
    }

    #[test]
    fn identification_shows_formatted_dates() {
        let (_, _, doc) = render(identification, &sample(), &HeaderAssets::default());
        let texts: Vec<String> = strings(&doc).into_iter().map(|(_, _, t)| t).collect();
        assert!(texts.contains(&"15/03/2024 13:45:02".to_string()));
        assert!(texts.contains(&"15/03/2024".to_string()));
    }

    #[test]
    fn long_name_pushes_address_row_down() {
        let mut data = sample();
        let (_, short_end, _) = render(payer, &data, &HeaderAssets::default());
        data.payer.name = "Associação Beneficente dos Trabalhadores da Indústria de Calçados \
                           do Vale do Rio dos Sinos e Região Metropolitana"
            .to_string();
        let (_, long_end, doc) = render(payer, &data, &HeaderAssets::default());
        assert!(long_end > short_end);

        let all = strings(&doc);
        let last_name_line = all
            .iter()
            .filter(|(_, _, t)| data.payer.name.contains(t.as_str()) && t.len() > 3)
            .map(|(_, b, _)| *b)
            .fold(Pt::ZERO, Pt::max);
        let address_label = all
            .iter()
            .find(|(_, _, t)| t == "Endereço")
            .map(|(_, b, _)| *b)
            .unwrap();
        assert!(address_label > last_name_line);
    }

    #[test]
    fn service_classification_is_clamped_to_two_lines() {
        let mut data = sample();
        data.service.national_description = "palavra ".repeat(60);
        let (_, _, doc) = render(service, &data, &HeaderAssets::default());
        let grid = GridSpec::danfse();
        let col0_right = grid.column_x(1);
        let lines: Vec<String> = strings(&doc)
            .into_iter()
            .filter(|(x, _, t)| *x < col0_right && (t.starts_with("01.03.02") || t.starts_with("palavra")))
            .map(|(_, _, t)| t)
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(crate::layout::ELLIPSIS));
    }

    #[test]
    fn intermediary_notice_is_fixed() {
        let (_, _, doc) = render(intermediary, &DocumentData::default(), &HeaderAssets::default());
        let texts: Vec<String> = strings(&doc).into_iter().map(|(_, _, t)| t).collect();
        assert_eq!(texts, vec!["INTERMEDIÁRIO DO SERVIÇO NÃO IDENTIFICADO NA NFS-e"]);
    }
}
