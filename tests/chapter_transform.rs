use safaribooks::dom::parse_html;
use safaribooks::formats::{Chapter, ChapterRecord, TocNode};
use safaribooks::registry::AssetRegistry;
use safaribooks::transform::{ChapterTransformer, TransformError};
use safaribooks::{page, toc};

const BOOK_ID: &str = "9781491958698";

fn record(filename: &str, title: &str) -> anyhow::Result<ChapterRecord> {
    Ok(serde_json::from_value(serde_json::json!({
        "filename": filename,
        "title": title,
        "content": format!("https://learning.oreilly.com/api/v1/book/{BOOK_ID}/chapter-content/{filename}"),
        "asset_base_url": format!("https://learning.oreilly.com/library/view/test/{BOOK_ID}/"),
        "images": ["fig.png"],
        "stylesheets": [],
        "site_styles": [],
    }))?)
}

#[test]
fn chapter_becomes_a_complete_xhtml_page() -> anyhow::Result<()> {
    let chapter = Chapter::from(record("ch01.html", "Intro")?);
    let mut stylesheets = AssetRegistry::new();
    let mut images = AssetRegistry::new();
    for image in &chapter.image_refs {
        images.register(image);
    }

    let transformer = ChapterTransformer {
        book_id: BOOK_ID,
        base_url: None,
        filename: &chapter.filename,
        title: &chapter.title,
    };
    let fragment = transformer.transform(
        parse_html(r#"<div id="sbo-rt-content"><a href="ch02.html">n</a><img src="fig.png"></div>"#),
        false,
        &chapter.stylesheet_urls(),
        &mut stylesheets,
    )?;

    assert_eq!(
        fragment.xhtml,
        r#"<div id="sbo-rt-content"><a href="ch02.xhtml">n</a><img src="Images/fig.png"/></div>"#
    );
    assert!(stylesheets.is_empty());
    assert_eq!(images.index_of("fig.png"), Some(0));
    assert_eq!(chapter.xhtml_filename(), "ch01.xhtml");

    let page = page::render(&fragment, false);
    assert!(page.starts_with("<!DOCTYPE html>\n<html lang=\"en\""));
    assert!(page.ends_with(&format!("<body>{}</body>\n</html>", fragment.xhtml)));
    Ok(())
}

#[test]
fn missing_content_container_names_the_chapter() -> anyhow::Result<()> {
    let chapter = Chapter::from(record("ch07.html", "Appendix")?);
    let transformer = ChapterTransformer {
        book_id: BOOK_ID,
        base_url: None,
        filename: &chapter.filename,
        title: &chapter.title,
    };
    let err = match transformer.transform(
        parse_html("<div id=\"main\"><p>nothing here</p></div>"),
        false,
        &[],
        &mut AssetRegistry::new(),
    ) {
        Ok(_) => anyhow::bail!("expected missing content to fail"),
        Err(err) => err,
    };

    assert!(matches!(err, TransformError::MissingContent { .. }));
    assert_eq!(
        err.to_string(),
        "Parser: book content's corrupted or not present: ch07.html (Appendix)"
    );
    Ok(())
}

#[test]
fn two_level_toc_has_depth_two() -> anyhow::Result<()> {
    let nodes: Vec<TocNode> = serde_json::from_value(serde_json::json!([{
        "id": "ch01",
        "fragment": "",
        "label": "Chapter 1",
        "href": "ch01.html",
        "depth": 1,
        "children": [{
            "id": "ch01s01",
            "fragment": "",
            "label": "Section",
            "href": "ch01.html#s01",
            "depth": 2,
            "children": []
        }]
    }]))?;

    let nav_map = toc::build(&nodes);
    assert_eq!(nav_map.max_depth, 2);
    assert_eq!(nav_map.total, 2);
    let first = nav_map.markup.find("playOrder=\"1\"");
    let second = nav_map.markup.find("playOrder=\"2\"");
    assert!(first.is_some() && second.is_some() && first < second);
    Ok(())
}
