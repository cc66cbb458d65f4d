use crate::transform::ParsedFragment;

const PAGE_HEAD: &str = "<!DOCTYPE html>\n\
<html lang=\"en\" xml:lang=\"en\" xmlns=\"http://www.w3.org/1999/xhtml\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
xsi:schemaLocation=\"http://www.w3.org/2002/06/xhtml2/ http://www.w3.org/MarkUp/SCHEMA/xhtml2.xsd\" \
xmlns:epub=\"http://www.idpf.org/2007/ops\">\n\
<head>\n";

const BASE_STYLE: &str = "<style type=\"text/css\">\
body{margin:1em;background-color:transparent!important;}\
#sbo-rt-content *{text-indent:0pt!important;}#sbo-rt-content .bq{margin-right:1em!important;}";

/// Stops tables and code blocks from overflowing on e-ink readers.
const EREADER_STYLE: &str = "#sbo-rt-content *{word-wrap:break-word!important;\
word-break:break-word!important;}#sbo-rt-content table,#sbo-rt-content pre\
{overflow-x:unset!important;overflow:unset!important;\
overflow-y:unset!important;white-space:pre-wrap!important;}";

/// Wraps a transformed chapter into a complete XHTML page.
pub fn render(fragment: &ParsedFragment, ereader: bool) -> String {
    let mut out = String::with_capacity(
        PAGE_HEAD.len() + BASE_STYLE.len() + fragment.page_css.len() + fragment.xhtml.len() + 256,
    );
    out.push_str(PAGE_HEAD);
    out.push_str(&fragment.page_css);
    out.push('\n');
    out.push_str(BASE_STYLE);
    if ereader {
        out.push_str(EREADER_STYLE);
    }
    out.push_str("</style></head>\n<body>");
    out.push_str(&fragment.xhtml);
    out.push_str("</body>\n</html>");
    out
}
