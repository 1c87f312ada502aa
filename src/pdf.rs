use crate::card::{CardFace, CardSpec};
use crate::error::CarnetPressError;
use crate::layout::{CardGeometry, ROWS_PER_PAGE};
use crate::model::{Settings, Student};
use crate::raster::FaceRenderer;
use crate::types::Pt;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::debug;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use std::io::Write;

/// One card position in the document: roster index, global serial and
/// the row on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardSlot {
    pub index: usize,
    pub serial: usize,
    pub row: usize,
}

/// Pure partition of the roster into pages of `per_page` cards, in
/// input order. Serials are global: page boundaries never reset them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pages: Vec<Vec<CardSlot>>,
}

impl PagePlan {
    pub fn new(total: usize, per_page: usize) -> PagePlan {
        let mut pages = Vec::new();
        if per_page == 0 {
            return PagePlan { pages };
        }
        let mut index = 0;
        while index < total {
            let end = (index + per_page).min(total);
            pages.push(
                (index..end)
                    .enumerate()
                    .map(|(row, i)| CardSlot {
                        index: i,
                        serial: i + 1,
                        row,
                    })
                    .collect(),
            );
            index = end;
        }
        PagePlan { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Vec<CardSlot>] {
        &self.pages
    }
}

/// Builds the final multi-page PDF: one page per batch of
/// `ROWS_PER_PAGE` students, each student one front/back image pair
/// placed per the shared geometry. Faces render strictly sequentially;
/// the first failure aborts the whole document.
pub fn assemble(
    students: &[Student],
    settings: &Settings,
    renderer: &mut dyn FaceRenderer,
    geometry: &CardGeometry,
) -> Result<Vec<u8>, CarnetPressError> {
    let plan = PagePlan::new(students.len(), ROWS_PER_PAGE);
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut page_ids: Vec<LoObjectId> = Vec::with_capacity(plan.page_count());
    let mut image_index = 1usize;

    for (page_number, slots) in plan.pages().iter().enumerate() {
        let mut content = String::new();
        let mut xobjects = lopdf::Dictionary::new();

        for slot in slots {
            let student = &students[slot.index];
            debug!(
                "rendering carnet {}/{} for {}",
                slot.serial,
                students.len(),
                student.display_name()
            );
            let spec = CardSpec {
                student,
                serial: slot.serial,
                total: students.len(),
                settings,
            };
            let position = geometry.slot(slot.row);

            for (face, x) in [
                (CardFace::Front, position.x_front),
                (CardFace::Back, position.x_back),
            ] {
                let rendered = renderer.render(&spec, face)?;
                let image = decode_face_png(&rendered.png)?;
                let object_id = add_image_xobject(&mut doc, image)?;
                let name = format!("Im{image_index}");
                image_index += 1;
                xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(object_id));
                content.push_str(&format!(
                    "q {} 0 0 {} {} {} cm /{} Do Q\n",
                    fmt_pt(geometry.card_width),
                    fmt_pt(geometry.card_height),
                    fmt_pt(x),
                    fmt_pt(position.y),
                    name
                ));
            }
        }

        let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => LoObject::Reference(pages_id),
            "MediaBox" => vec![
                LoObject::Integer(0),
                LoObject::Integer(0),
                LoObject::Real(geometry.page.width.to_f32()),
                LoObject::Real(geometry.page.height.to_f32()),
            ],
            "Resources" => dictionary! {
                "XObject" => LoObject::Dictionary(xobjects),
            },
            "Contents" => LoObject::Reference(content_id),
        });
        page_ids.push(page_id);
        debug!("assembled page {}/{}", page_number + 1, plan.page_count());
    }

    let kids: Vec<LoObject> = page_ids
        .iter()
        .map(|id| LoObject::Reference(*id))
        .collect();
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => LoObject::Reference(pages_id),
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| CarnetPressError::Assembly(format!("pdf serialization failed: {e}")))?;
    Ok(bytes)
}

struct ImageData {
    width: u32,
    height: u32,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Re-encodes a rendered PNG face as raw FlateDecode RGB samples, with
/// a separate gray SMask stream when any pixel is translucent.
fn decode_face_png(png: &[u8]) -> Result<ImageData, CarnetPressError> {
    let decoded = image::load_from_memory(png)
        .map_err(|e| CarnetPressError::Assembly(format!("rendered face is not decodable: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    Ok(ImageData {
        width,
        height,
        data: flate_compress(&rgb)?,
        alpha: if has_alpha {
            Some(flate_compress(&alpha)?)
        } else {
            None
        },
    })
}

fn add_image_xobject(
    doc: &mut LoDocument,
    image: ImageData,
) -> Result<LoObjectId, CarnetPressError> {
    let ImageData {
        width,
        height,
        data,
        alpha,
    } = image;

    let smask_id = alpha.map(|alpha| {
        doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            alpha,
        ))
    });

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(id) = smask_id {
        dict.set("SMask", LoObject::Reference(id));
    }
    Ok(doc.add_object(LoStream::new(dict, data)))
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, CarnetPressError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| CarnetPressError::Assembly(format!("flate compression failed: {e}")))
}

/// Formats a `Pt` as a decimal content-stream operand from its milli
/// value, so identical geometry always serializes identically.
fn fmt_pt(value: Pt) -> String {
    let milli = value.to_milli_i64();
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let whole = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        format!("{sign}{whole}")
    } else {
        let frac = format!("{frac:03}");
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RenderedFace;
    use tiny_skia::Pixmap;

    fn roster(count: usize) -> Vec<Student> {
        (0..count)
            .map(|i| Student {
                document_number: format!("{:08}", 70000000 + i),
                names: format!("Estudiante {}", i + 1),
                paternal_last_name: "Palma".to_string(),
                maternal_last_name: "Soriano".to_string(),
                full_name: String::new(),
                grade: "2do Grado".to_string(),
                section: "A".to_string(),
                photo: None,
            })
            .collect()
    }

    struct StubRenderer {
        png: Vec<u8>,
        calls: Vec<(usize, CardFace)>,
        fail_at_serial: Option<usize>,
    }

    impl StubRenderer {
        fn new() -> Self {
            let mut pixmap = Pixmap::new(2, 2).unwrap();
            pixmap.fill(tiny_skia::Color::from_rgba8(200, 100, 50, 255));
            Self {
                png: pixmap.encode_png().unwrap(),
                calls: Vec::new(),
                fail_at_serial: None,
            }
        }
    }

    impl FaceRenderer for StubRenderer {
        fn render(
            &mut self,
            spec: &CardSpec<'_>,
            face: CardFace,
        ) -> Result<RenderedFace, CarnetPressError> {
            if self.fail_at_serial == Some(spec.serial) {
                return Err(CarnetPressError::Raster("stub failure".to_string()));
            }
            self.calls.push((spec.serial, face));
            Ok(RenderedFace {
                png: self.png.clone(),
                width: 2,
                height: 2,
            })
        }
    }

    #[test]
    fn plan_partitions_in_input_order() {
        let plan = PagePlan::new(12, 5);
        let sizes: Vec<usize> = plan.pages().iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        // Serials stay global across the page boundary.
        assert_eq!(plan.pages()[1][0].serial, 6);
        assert_eq!(plan.pages()[1][0].row, 0);
        assert_eq!(plan.pages()[2][1].serial, 12);
        let serials: Vec<usize> = plan
            .pages()
            .iter()
            .flatten()
            .map(|slot| slot.serial)
            .collect();
        assert_eq!(serials, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn plan_page_count_is_ceiling_division() {
        assert_eq!(PagePlan::new(0, 5).page_count(), 0);
        assert_eq!(PagePlan::new(1, 5).page_count(), 1);
        assert_eq!(PagePlan::new(5, 5).page_count(), 1);
        assert_eq!(PagePlan::new(6, 5).page_count(), 2);
        assert_eq!(PagePlan::new(100, 5).page_count(), 20);
    }

    #[test]
    fn assemble_emits_one_page_per_five_students() {
        let students = roster(12);
        let settings = Settings::default();
        let geometry = CardGeometry::a4();
        let mut renderer = StubRenderer::new();
        let bytes = assemble(&students, &settings, &mut renderer, &geometry).unwrap();

        let doc = LoDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn assemble_renders_faces_sequentially_with_global_serials() {
        let students = roster(7);
        let settings = Settings::default();
        let geometry = CardGeometry::a4();
        let mut renderer = StubRenderer::new();
        assemble(&students, &settings, &mut renderer, &geometry).unwrap();

        let expected: Vec<(usize, CardFace)> = (1..=7)
            .flat_map(|serial| [(serial, CardFace::Front), (serial, CardFace::Back)])
            .collect();
        assert_eq!(renderer.calls, expected);
    }

    #[test]
    fn assemble_places_two_images_per_student_on_each_page() {
        let students = roster(12);
        let settings = Settings::default();
        let geometry = CardGeometry::a4();
        let mut renderer = StubRenderer::new();
        let bytes = assemble(&students, &settings, &mut renderer, &geometry).unwrap();

        let doc = LoDocument::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        let mut xobject_counts = Vec::new();
        for (_, page_id) in pages {
            let page = doc
                .get_object(page_id)
                .and_then(LoObject::as_dict)
                .unwrap();
            let resources = page.get(b"Resources").and_then(LoObject::as_dict).unwrap();
            let xobjects = resources.get(b"XObject").and_then(LoObject::as_dict).unwrap();
            xobject_counts.push(xobjects.len());
        }
        // 5 + 5 + 2 students, two faces each.
        assert_eq!(xobject_counts, vec![10, 10, 4]);
    }

    #[test]
    fn renderer_failure_aborts_the_whole_batch() {
        let students = roster(12);
        let settings = Settings::default();
        let geometry = CardGeometry::a4();
        let mut renderer = StubRenderer::new();
        renderer.fail_at_serial = Some(7);
        let err = assemble(&students, &settings, &mut renderer, &geometry).unwrap_err();
        assert!(matches!(err, CarnetPressError::Raster(_)));
        // Rendering stopped at the failure; nothing after serial 6.
        assert_eq!(renderer.calls.len(), 12);
    }

    #[test]
    fn fmt_pt_serializes_milli_decimals() {
        assert_eq!(fmt_pt(Pt::from_f32(28.346)), "28.346");
        assert_eq!(fmt_pt(Pt::from_f32(240.0)), "240");
        assert_eq!(fmt_pt(Pt::from_f32(-8.5)), "-8.5");
        assert_eq!(fmt_pt(Pt::ZERO), "0");
    }
}
