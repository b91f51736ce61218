//! LibXML2 FFI Wrapper Module
//!
//! Safe wrappers around the parts of libxml2 this crate needs: the XML parser,
//! the XML Schema (XSD) engine, the RelaxNG engine and the XPath 1.0 evaluator.
//!
//! ## Why direct FFI
//!
//! The Rust XML ecosystem has good parsers (roxmltree, quick-xml) but nothing
//! that validates XSD or RelaxNG at runtime, and no XPath engine with variable
//! binding. libxml2 provides all four behind one C API, so we bind it directly
//! and wrap every allocation in an RAII owner.
//!
//! ## Thread Safety Strategy
//!
//! - **Initialization**: `xmlInitParser` and friends run exactly once behind a `Once`.
//! - **Grammar compilation**: NOT thread-safe in libxml2. All XSD/RelaxNG parsing
//!   goes through [`COMPILE_LOCK`].
//! - **Compiled grammars**: read-only after parsing; shared across threads via `Arc`.
//! - **Validation / document parsing / XPath**: each call creates its own context,
//!   so these run fully in parallel.
//!
//! ## Memory ownership
//!
//! | libxml2 object       | Owner in Rust      | Freed with               |
//! |----------------------|--------------------|--------------------------|
//! | `xmlSchema`          | [`XmlSchemaPtr`]   | `xmlSchemaFree`          |
//! | `xmlRelaxNG`         | [`RelaxNgPtr`]     | `xmlRelaxNGFree`         |
//! | `xmlDoc`             | [`XmlDocument`]    | `xmlFreeDoc`             |
//! | `xmlBuffer`          | one serialization  | `xmlBufferFree`          |
//! | `xmlXPathContext`    | [`XPathQuery`]     | `xmlXPathFreeContext`    |
//! | bound XPath variable | the XPath context  | (freed with the context) |

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_void};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// Serializes grammar compilation; libxml2's schema parsers share global state.
static COMPILE_LOCK: Mutex<()> = Mutex::new(());

/// `XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET`
const PARSE_OPTIONS: c_int = (1 << 5) | (1 << 6) | (1 << 11);

const XML_ELEMENT_NODE: c_int = 1;
const XML_TEXT_NODE: c_int = 3;
const XML_CDATA_SECTION_NODE: c_int = 4;
const XPATH_NODESET: c_int = 1;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNG {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNGParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNGValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathContext {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlBuffer {
    _private: [u8; 0],
}

// Public libxml2 structures whose fields we read

#[repr(C)]
pub struct XmlNs {
    pub next: *mut XmlNs,
    pub ns_type: c_int,
    pub href: *const c_char,
    pub prefix: *const c_char,
    pub _private: *mut c_void,
    pub context: *mut XmlDoc,
}

#[repr(C)]
pub struct XmlNode {
    pub _private: *mut c_void,
    pub node_type: c_int,
    pub name: *const c_char,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
    pub next: *mut XmlNode,
    pub prev: *mut XmlNode,
    pub doc: *mut XmlDoc,
    pub ns: *mut XmlNs,
    pub content: *mut c_char,
    pub properties: *mut XmlAttr,
    pub ns_def: *mut XmlNs,
    pub psvi: *mut c_void,
    pub line: u16,
    pub extra: u16,
}

/// Leading fields of `xmlAttr`; only ever read through libxml2-owned pointers
#[repr(C)]
pub struct XmlAttr {
    pub _private: *mut c_void,
    pub node_type: c_int,
    pub name: *const c_char,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
    pub next: *mut XmlAttr,
    pub prev: *mut XmlAttr,
    pub doc: *mut XmlDoc,
    pub ns: *mut XmlNs,
}

#[repr(C)]
pub struct XmlNodeSet {
    pub node_nr: c_int,
    pub node_max: c_int,
    pub node_tab: *mut *mut XmlNode,
}

#[repr(C)]
pub struct XmlXPathObject {
    pub object_type: c_int,
    pub nodesetval: *mut XmlNodeSet,
    pub boolval: c_int,
    pub floatval: f64,
    pub stringval: *mut c_char,
    pub user: *mut c_void,
    pub index: c_int,
    pub user2: *mut c_void,
    pub index2: c_int,
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();
    pub fn xmlRelaxNGInitTypes() -> c_int;

    // Document parsing
    pub fn xmlNewParserCtxt() -> *mut XmlParserCtxt;
    pub fn xmlFreeParserCtxt(ctxt: *mut XmlParserCtxt);
    pub fn xmlCtxtReadMemory(
        ctxt: *mut XmlParserCtxt,
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlCtxtGetLastError(ctx: *mut c_void) -> *const xmlError;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlDocGetRootElement(doc: *const XmlDoc) -> *mut XmlNode;
    pub fn xmlNewDoc(version: *const c_char) -> *mut XmlDoc;
    pub fn xmlDocCopyNode(node: *const XmlNode, doc: *mut XmlDoc, extended: c_int) -> *mut XmlNode;
    pub fn xmlDocSetRootElement(doc: *mut XmlDoc, root: *mut XmlNode) -> *mut XmlNode;
    pub fn xmlFreeNode(node: *mut XmlNode);

    // Serialization
    pub fn xmlBufferCreate() -> *mut XmlBuffer;
    pub fn xmlBufferFree(buf: *mut XmlBuffer);
    pub fn xmlBufferContent(buf: *const XmlBuffer) -> *const c_char;
    pub fn xmlNodeDump(
        buf: *mut XmlBuffer,
        doc: *mut XmlDoc,
        node: *mut XmlNode,
        level: c_int,
        format: c_int,
    ) -> c_int;

    // XML Schema
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    // RelaxNG
    pub fn xmlRelaxNGNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlRelaxNGParserCtxt;
    pub fn xmlRelaxNGSetParserStructuredErrors(
        ctxt: *mut XmlRelaxNGParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlRelaxNGParse(ctxt: *mut XmlRelaxNGParserCtxt) -> *mut XmlRelaxNG;
    pub fn xmlRelaxNGFreeParserCtxt(ctxt: *mut XmlRelaxNGParserCtxt);
    pub fn xmlRelaxNGFree(schema: *mut XmlRelaxNG);
    pub fn xmlRelaxNGNewValidCtxt(schema: *mut XmlRelaxNG) -> *mut XmlRelaxNGValidCtxt;
    pub fn xmlRelaxNGFreeValidCtxt(ctxt: *mut XmlRelaxNGValidCtxt);
    pub fn xmlRelaxNGSetValidStructuredErrors(
        ctxt: *mut XmlRelaxNGValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlRelaxNGValidateDoc(ctxt: *mut XmlRelaxNGValidCtxt, doc: *mut XmlDoc) -> c_int;

    // XPath
    pub fn xmlXPathNewContext(doc: *mut XmlDoc) -> *mut XmlXPathContext;
    pub fn xmlXPathFreeContext(ctxt: *mut XmlXPathContext);
    pub fn xmlXPathRegisterNs(
        ctxt: *mut XmlXPathContext,
        prefix: *const c_char,
        ns_uri: *const c_char,
    ) -> c_int;
    pub fn xmlXPathRegisterVariable(
        ctxt: *mut XmlXPathContext,
        name: *const c_char,
        value: *mut XmlXPathObject,
    ) -> c_int;
    pub fn xmlXPathNewString(val: *const c_char) -> *mut XmlXPathObject;
    pub fn xmlXPathEval(expr: *const c_char, ctxt: *mut XmlXPathContext) -> *mut XmlXPathObject;
    pub fn xmlXPathFreeObject(obj: *mut XmlXPathObject);
}

/// Severity reported by libxml2 for a single diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Warning,
    Error,
    Fatal,
}

impl ErrorLevel {
    fn from_raw(level: c_int) -> Self {
        match level {
            1 => ErrorLevel::Warning,
            3 => ErrorLevel::Fatal,
            _ => ErrorLevel::Error,
        }
    }

    /// Label used when rendering violations, `Warning` or `Error`
    pub fn label(&self) -> &'static str {
        match self {
            ErrorLevel::Warning => "Warning",
            ErrorLevel::Error | ErrorLevel::Fatal => "Error",
        }
    }
}

/// One diagnostic captured from a libxml2 structured error callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMessage {
    pub level: ErrorLevel,
    pub line: i32,
    pub message: String,
}

impl XmlMessage {
    /// # Safety
    ///
    /// `error` must be null or point to a live `xmlError`.
    unsafe fn from_raw(error: *const xmlError) -> Option<Self> {
        if error.is_null() {
            return None;
        }
        let error = unsafe { &*error };
        let message = unsafe { c_str_lossy(error.message) }?;
        Some(XmlMessage {
            level: ErrorLevel::from_raw(error.level),
            line: error.line,
            message: message.trim().to_string(),
        })
    }
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    let messages = unsafe { &mut *(user_data as *mut Vec<XmlMessage>) };

    if let Some(message) = unsafe { XmlMessage::from_raw(error) } {
        messages.push(message);
    }
}

/// # Safety
///
/// `ptr` must be null or a NUL-terminated string that outlives the returned value.
unsafe fn c_str_lossy(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn buffer_len(data: &[u8]) -> LibXml2Result<c_int> {
    c_int::try_from(data.len()).map_err(|_| LibXml2Error::InputTooLarge { size: data.len() })
}

fn c_string(value: &str) -> LibXml2Result<CString> {
    CString::new(value).map_err(|_| LibXml2Error::InteriorNul {
        value: value.replace('\0', "\\0"),
    })
}

/// A libxml2 compiled grammar that is released with a type-specific free function
pub trait OwnedGrammar {
    /// # Safety
    ///
    /// `ptr` must have been allocated by libxml2 and not freed yet.
    unsafe fn free(ptr: *mut Self);
}

impl OwnedGrammar for XmlSchema {
    unsafe fn free(ptr: *mut Self) {
        unsafe { xmlSchemaFree(ptr) }
    }
}

impl OwnedGrammar for XmlRelaxNG {
    unsafe fn free(ptr: *mut Self) {
        unsafe { xmlRelaxNGFree(ptr) }
    }
}

/// Thread-safe, reference-counted owner of a compiled libxml2 grammar
///
/// The grammar is freed when the last clone is dropped.
pub struct GrammarPtr<T: OwnedGrammar> {
    inner: Arc<GrammarInner<T>>,
}

struct GrammarInner<T: OwnedGrammar> {
    ptr: *mut T,
    _phantom: PhantomData<T>,
}

// Safety: compiled schemas are read-only after parsing; every validation
// creates its own context (http://xmlsoft.org/threads.html).
unsafe impl<T: OwnedGrammar> Send for GrammarInner<T> {}
unsafe impl<T: OwnedGrammar> Sync for GrammarInner<T> {}

pub type XmlSchemaPtr = GrammarPtr<XmlSchema>;
pub type RelaxNgPtr = GrammarPtr<XmlRelaxNG>;

impl<T: OwnedGrammar> GrammarPtr<T> {
    /// # Safety
    ///
    /// The pointer must come from the matching libxml2 parse function and
    /// must not be freed by anyone else.
    unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(GrammarPtr {
            inner: Arc::new(GrammarInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.inner.ptr
    }

    /// Check if the grammar pointer is valid (non-null)
    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl<T: OwnedGrammar> std::fmt::Debug for GrammarPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarPtr")
            .field("ptr", &self.inner.ptr)
            .finish()
    }
}

impl<T: OwnedGrammar> Clone for GrammarPtr<T> {
    fn clone(&self) -> Self {
        GrammarPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: OwnedGrammar> Drop for GrammarInner<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { T::free(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// A parsed, well-formed XML document
pub struct XmlDocument {
    ptr: *mut XmlDoc,
}

// Safety: a document is owned by exactly one XmlDocument and never aliased
// outside of borrows tied to it.
unsafe impl Send for XmlDocument {}

impl XmlDocument {
    /// Root element, if the document has one
    pub fn root(&self) -> Option<XmlElement<'_>> {
        let node = unsafe { xmlDocGetRootElement(self.ptr) };
        XmlElement::from_raw(node)
    }

    /// A new standalone document whose root is a deep copy of `element`
    ///
    /// Namespaces the element uses are redeclared on the copy.
    pub fn from_element(element: XmlElement<'_>) -> LibXml2Result<XmlDocument> {
        unsafe {
            let doc = xmlNewDoc(c"1.0".as_ptr());
            if doc.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            let document = XmlDocument { ptr: doc };

            let copy = xmlDocCopyNode(element.node, doc, 1);
            if copy.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            xmlDocSetRootElement(doc, copy);
            Ok(document)
        }
    }

    /// Start an XPath evaluation over this document
    pub fn xpath(&self) -> LibXml2Result<XPathQuery<'_>> {
        let ctxt = unsafe { xmlXPathNewContext(self.ptr) };
        if ctxt.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }
        Ok(XPathQuery {
            ctxt,
            _doc: PhantomData,
        })
    }

    fn as_ptr(&self) -> *mut XmlDoc {
        self.ptr
    }
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlFreeDoc(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Borrowed element node inside an [`XmlDocument`]
///
/// Equality and hashing follow node identity, not content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlElement<'doc> {
    node: *mut XmlNode,
    _doc: PhantomData<&'doc XmlDocument>,
}

impl<'doc> XmlElement<'doc> {
    fn from_raw(node: *mut XmlNode) -> Option<Self> {
        if node.is_null() || unsafe { (*node).node_type } != XML_ELEMENT_NODE {
            return None;
        }
        Some(XmlElement {
            node,
            _doc: PhantomData,
        })
    }

    /// Local name of the element
    pub fn name(&self) -> &'doc str {
        let name = unsafe { (*self.node).name };
        if name.is_null() {
            return "";
        }
        unsafe { CStr::from_ptr(name) }.to_str().unwrap_or("")
    }

    /// Namespace URI the element belongs to, if any
    pub fn namespace(&self) -> Option<&'doc str> {
        let ns = unsafe { (*self.node).ns };
        if ns.is_null() {
            return None;
        }
        let href = unsafe { (*ns).href };
        if href.is_null() {
            return None;
        }
        unsafe { CStr::from_ptr(href) }.to_str().ok()
    }

    /// Prefix of the element's qualified name, if any
    pub fn prefix(&self) -> Option<&'doc str> {
        let ns = unsafe { (*self.node).ns };
        if ns.is_null() {
            return None;
        }
        let prefix = unsafe { (*ns).prefix };
        if prefix.is_null() {
            return None;
        }
        unsafe { CStr::from_ptr(prefix) }.to_str().ok()
    }

    /// Source line of the start tag
    pub fn line(&self) -> u16 {
        unsafe { (*self.node).line }
    }

    /// Parent element; `None` at the root
    pub fn parent(&self) -> Option<XmlElement<'doc>> {
        XmlElement::from_raw(unsafe { (*self.node).parent })
    }

    /// Value of the attribute with this local name and no namespace
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attribute_nodes()
            .find(|attr| unsafe { (**attr).ns.is_null() } && attribute_name(*attr) == name)
            .map(attribute_value)
    }

    /// Every attribute as `(qualified name, value)`, in document order
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.attribute_nodes()
            .map(|attr| {
                let name = attribute_name(attr);
                let ns = unsafe { (*attr).ns };
                let prefix = if ns.is_null() {
                    None
                } else {
                    unsafe { c_str_lossy((*ns).prefix) }
                };
                let qualified = match prefix {
                    Some(prefix) => format!("{}:{}", prefix, name),
                    None => name,
                };
                (qualified, attribute_value(attr))
            })
            .collect()
    }

    /// Namespace declarations made on this element as `(prefix, uri)`
    pub fn namespace_declarations(&self) -> Vec<(Option<String>, String)> {
        let mut declarations = Vec::new();
        let mut cursor = unsafe { (*self.node).ns_def };
        while !cursor.is_null() {
            let ns = unsafe { &*cursor };
            let prefix = unsafe { c_str_lossy(ns.prefix) };
            let href = unsafe { c_str_lossy(ns.href) }.unwrap_or_default();
            declarations.push((prefix, href));
            cursor = ns.next;
        }
        declarations
    }

    /// Serialize the subtree as XML text
    ///
    /// Namespace declarations made on ancestors are not repeated.
    pub fn to_xml_string(&self) -> LibXml2Result<String> {
        unsafe {
            let buffer = xmlBufferCreate();
            if buffer.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            let written = xmlNodeDump(buffer, (*self.node).doc, self.node, 0, 0);
            let text = if written < 0 {
                None
            } else {
                c_str_lossy(xmlBufferContent(buffer))
            };
            xmlBufferFree(buffer);
            text.ok_or(LibXml2Error::MemoryAllocation)
        }
    }

    fn attribute_nodes(&self) -> impl Iterator<Item = *mut XmlAttr> + 'doc {
        let mut cursor = unsafe { (*self.node).properties };
        std::iter::from_fn(move || {
            if cursor.is_null() {
                return None;
            }
            let current = cursor;
            cursor = unsafe { (*current).next };
            Some(current)
        })
    }

    /// Element children in document order
    pub fn children(&self) -> ElementChildren<'doc> {
        ElementChildren {
            next: unsafe { (*self.node).children },
            _doc: PhantomData,
        }
    }

    /// First element child with the given local name
    pub fn child(&self, name: &str) -> Option<XmlElement<'doc>> {
        self.children().find(|child| child.name() == name)
    }

    /// Concatenated text and CDATA content of the direct children
    pub fn text(&self) -> String {
        let mut text = String::new();
        let mut cursor = unsafe { (*self.node).children };
        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            if (node.node_type == XML_TEXT_NODE || node.node_type == XML_CDATA_SECTION_NODE)
                && !node.content.is_null()
            {
                text.push_str(&unsafe { CStr::from_ptr(node.content) }.to_string_lossy());
            }
            cursor = node.next;
        }
        text
    }
}

impl std::fmt::Debug for XmlElement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlElement")
            .field("name", &self.name())
            .field("line", &self.line())
            .finish()
    }
}

fn attribute_name(attr: *mut XmlAttr) -> String {
    unsafe { c_str_lossy((*attr).name) }.unwrap_or_default()
}

fn attribute_value(attr: *mut XmlAttr) -> String {
    let mut value = String::new();
    let mut cursor = unsafe { (*attr).children };
    while !cursor.is_null() {
        let node = unsafe { &*cursor };
        if let Some(text) = unsafe { c_str_lossy(node.content) } {
            value.push_str(&text);
        }
        cursor = node.next;
    }
    value
}

/// Iterator over the element children of an [`XmlElement`]
pub struct ElementChildren<'doc> {
    next: *mut XmlNode,
    _doc: PhantomData<&'doc XmlDocument>,
}

impl<'doc> Iterator for ElementChildren<'doc> {
    type Item = XmlElement<'doc>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.next.is_null() {
            let current = self.next;
            self.next = unsafe { (*current).next };
            if let Some(element) = XmlElement::from_raw(current) {
                return Some(element);
            }
        }
        None
    }
}

/// XPath evaluation context bound to one document
///
/// User-supplied values are bound as XPath variables rather than spliced into
/// the expression text, so they can never change the shape of the query.
pub struct XPathQuery<'doc> {
    ctxt: *mut XmlXPathContext,
    _doc: PhantomData<&'doc XmlDocument>,
}

impl<'doc> XPathQuery<'doc> {
    /// Bind a namespace prefix for use in expressions
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) -> LibXml2Result<()> {
        let prefix = c_string(prefix)?;
        let uri = c_string(uri)?;
        let rc = unsafe { xmlXPathRegisterNs(self.ctxt, prefix.as_ptr(), uri.as_ptr()) };
        if rc != 0 {
            return Err(LibXml2Error::XPath {
                details: format!("failed to register namespace prefix {:?}", prefix),
            });
        }
        Ok(())
    }

    /// Bind `$name` to a string value
    pub fn bind_string(&mut self, name: &str, value: &str) -> LibXml2Result<()> {
        let c_name = c_string(name)?;
        let c_value = c_string(value)?;
        unsafe {
            let object = xmlXPathNewString(c_value.as_ptr());
            if object.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            // On success the context owns the object and frees it with itself.
            if xmlXPathRegisterVariable(self.ctxt, c_name.as_ptr(), object) != 0 {
                xmlXPathFreeObject(object);
                return Err(LibXml2Error::XPath {
                    details: format!("failed to bind variable ${}", name),
                });
            }
        }
        Ok(())
    }

    /// Evaluate an expression and return the selected elements in document order
    pub fn select_elements(&self, expression: &str) -> LibXml2Result<Vec<XmlElement<'doc>>> {
        let c_expr = c_string(expression)?;
        unsafe {
            let object = xmlXPathEval(c_expr.as_ptr(), self.ctxt);
            if object.is_null() {
                return Err(LibXml2Error::XPath {
                    details: format!("evaluation failed for '{}'", expression),
                });
            }

            let result = if (*object).object_type != XPATH_NODESET {
                Err(LibXml2Error::XPath {
                    details: format!("'{}' did not evaluate to a node-set", expression),
                })
            } else {
                let set = (*object).nodesetval;
                let mut elements = Vec::new();
                if !set.is_null() && (*set).node_nr > 0 && !(*set).node_tab.is_null() {
                    let nodes =
                        std::slice::from_raw_parts((*set).node_tab, (*set).node_nr as usize);
                    elements.extend(nodes.iter().filter_map(|&node| XmlElement::from_raw(node)));
                }
                Ok(elements)
            };

            // Frees the node-set container only; the nodes belong to the document.
            xmlXPathFreeObject(object);
            result
        }
    }
}

impl Drop for XPathQuery<'_> {
    fn drop(&mut self) {
        if !self.ctxt.is_null() {
            unsafe { xmlXPathFreeContext(self.ctxt) };
            self.ctxt = std::ptr::null_mut();
        }
    }
}

/// Outcome of running a compiled grammar over a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Validation succeeded (return code 0); libxml2 may still have warned
    Valid { warnings: Vec<XmlMessage> },
    /// Validation failed with errors (return code > 0)
    Invalid { messages: Vec<XmlMessage> },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationOutcome {
    /// Create an outcome from the libxml2 return code and captured messages
    pub fn from_code(code: c_int, messages: Vec<XmlMessage>) -> Self {
        match code {
            0 => ValidationOutcome::Valid { warnings: messages },
            n if n > 0 => ValidationOutcome::Invalid { messages },
            n => ValidationOutcome::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }
}

/// Entry point for all libxml2 work
///
/// Creating a wrapper initializes libxml2 once per process; wrappers carry no
/// state and can be created freely.
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
            xmlRelaxNGInitTypes();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse a document from text
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::Malformed` with libxml2's first fatal message when
    /// the text is not well-formed XML.
    pub fn parse_document(&self, text: &str) -> LibXml2Result<XmlDocument> {
        let size = buffer_len(text.as_bytes())?;
        unsafe {
            let ctxt = xmlNewParserCtxt();
            if ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            let doc = xmlCtxtReadMemory(
                ctxt,
                text.as_ptr() as *const c_char,
                size,
                c"document.xml".as_ptr(),
                c"UTF-8".as_ptr(),
                PARSE_OPTIONS,
            );

            let result = if doc.is_null() {
                let details = XmlMessage::from_raw(xmlCtxtGetLastError(ctxt as *mut c_void))
                    .map(|m| format!("{} (line {})", m.message, m.line))
                    .unwrap_or_else(|| "document could not be parsed".to_string());
                Err(LibXml2Error::Malformed { details })
            } else {
                Ok(XmlDocument { ptr: doc })
            };

            xmlFreeParserCtxt(ctxt);
            result
        }
    }

    /// Compile an XML Schema (XSD) from memory
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::SchemaParseFailed` with the parser diagnostics.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = buffer_len(schema_data)?;
        let _guard = COMPILE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut messages: Vec<XmlMessage> = Vec::new();

        unsafe {
            let parser_ctxt =
                xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                &mut messages as *mut Vec<XmlMessage> as *mut c_void,
            );
            let schema = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            XmlSchemaPtr::from_raw(schema).ok_or_else(|| LibXml2Error::SchemaParseFailed {
                details: join_messages(&messages),
            })
        }
    }

    /// Compile a RelaxNG grammar (XML syntax) from memory
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::SchemaParseFailed` with the parser diagnostics.
    pub fn parse_relaxng_from_memory(&self, grammar_data: &[u8]) -> LibXml2Result<RelaxNgPtr> {
        let size = buffer_len(grammar_data)?;
        let _guard = COMPILE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut messages: Vec<XmlMessage> = Vec::new();

        unsafe {
            let parser_ctxt =
                xmlRelaxNGNewMemParserCtxt(grammar_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlRelaxNGSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                &mut messages as *mut Vec<XmlMessage> as *mut c_void,
            );
            let grammar = xmlRelaxNGParse(parser_ctxt);
            xmlRelaxNGFreeParserCtxt(parser_ctxt);

            RelaxNgPtr::from_raw(grammar).ok_or_else(|| LibXml2Error::SchemaParseFailed {
                details: join_messages(&messages),
            })
        }
    }

    /// Validate a parsed document against a compiled XSD
    ///
    /// Safe to call concurrently: each call owns its validation context.
    pub fn validate_schema(
        &self,
        schema: &XmlSchemaPtr,
        document: &XmlDocument,
    ) -> LibXml2Result<ValidationOutcome> {
        let mut messages: Vec<XmlMessage> = Vec::new();
        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                &mut messages as *mut Vec<XmlMessage> as *mut c_void,
            );
            let code = xmlSchemaValidateDoc(valid_ctxt, document.as_ptr());
            xmlSchemaFreeValidCtxt(valid_ctxt);

            Ok(ValidationOutcome::from_code(code, messages))
        }
    }

    /// Validate a parsed document against a compiled RelaxNG grammar
    ///
    /// Safe to call concurrently: each call owns its validation context.
    pub fn validate_relaxng(
        &self,
        grammar: &RelaxNgPtr,
        document: &XmlDocument,
    ) -> LibXml2Result<ValidationOutcome> {
        let mut messages: Vec<XmlMessage> = Vec::new();
        unsafe {
            let valid_ctxt = xmlRelaxNGNewValidCtxt(grammar.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            xmlRelaxNGSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                &mut messages as *mut Vec<XmlMessage> as *mut c_void,
            );
            let code = xmlRelaxNGValidateDoc(valid_ctxt, document.as_ptr());
            xmlRelaxNGFreeValidCtxt(valid_ctxt);

            Ok(ValidationOutcome::from_code(code, messages))
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn join_messages(messages: &[XmlMessage]) -> String {
    if messages.is_empty() {
        return "no diagnostics reported".to_string();
    }
    messages
        .iter()
        .map(|m| m.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    const SIMPLE_RNG: &str = r#"<element name="root" xmlns="http://relaxng.org/ns/structure/1.0">
    <text/>
</element>"#;

    #[test]
    fn test_libxml2_wrapper_creation() {
        let wrapper = LibXml2Wrapper::new();
        drop(wrapper);
    }

    #[test]
    fn test_schema_parsing_success() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        assert!(schema.is_valid());
    }

    #[test]
    fn test_schema_parsing_invalid_schema() {
        let wrapper = LibXml2Wrapper::new();
        let result = wrapper.parse_schema_from_memory(b"<invalid>not a schema</invalid>");

        match result {
            Err(LibXml2Error::SchemaParseFailed { .. }) => (),
            Err(other) => panic!("Expected SchemaParseFailed, got {:?}", other),
            Ok(_) => panic!("Expected SchemaParseFailed, got a schema"),
        }
    }

    #[test]
    fn test_relaxng_parsing_success_and_failure() {
        let wrapper = LibXml2Wrapper::new();
        assert!(wrapper.parse_relaxng_from_memory(SIMPLE_RNG.as_bytes()).is_ok());
        assert!(wrapper.parse_relaxng_from_memory(b"<notagrammar/>").is_err());
    }

    #[test]
    fn test_parse_document_reports_malformed_input() {
        let wrapper = LibXml2Wrapper::new();
        match wrapper.parse_document("<root><open></root>") {
            Err(LibXml2Error::Malformed { details }) => assert!(!details.is_empty()),
            Err(other) => panic!("Expected Malformed, got {:?}", other),
            Ok(_) => panic!("Expected Malformed, got a document"),
        }
    }

    #[test]
    fn test_element_navigation() {
        let wrapper = LibXml2Wrapper::new();
        let doc = wrapper
            .parse_document(r#"<a xmlns="urn:x"><b>one</b><!-- c --><c><![CDATA[two]]></c></a>"#)
            .unwrap();
        let root = doc.root().unwrap();

        assert_eq!(root.name(), "a");
        assert_eq!(root.namespace(), Some("urn:x"));
        let names: Vec<_> = root.children().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(root.child("b").unwrap().text(), "one");
        assert_eq!(root.child("c").unwrap().text(), "two");
        assert!(root.child("missing").is_none());
    }

    #[test]
    fn test_xpath_variables_are_not_parsed_as_syntax() {
        let wrapper = LibXml2Wrapper::new();
        let doc = wrapper
            .parse_document(r#"<r><v>it's "quoted" ]) or 1=1</v><v>plain</v></r>"#)
            .unwrap();
        let mut query = doc.xpath().unwrap();
        query.bind_string("needle", "' or '1'='1").unwrap();

        let hits = query.select_elements("/r/v[contains(., $needle)]").unwrap();
        assert!(hits.is_empty());

        query.bind_string("needle", "\"quoted\" ])").unwrap();
        let hits = query.select_elements("/r/v[contains(., $needle)]").unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_validation_outcome_from_code() {
        assert_eq!(
            ValidationOutcome::from_code(0, vec![]),
            ValidationOutcome::Valid { warnings: vec![] }
        );
        assert_eq!(
            ValidationOutcome::from_code(2, vec![]),
            ValidationOutcome::Invalid { messages: vec![] }
        );
        assert_eq!(
            ValidationOutcome::from_code(-1, vec![]),
            ValidationOutcome::InternalError { code: -1 }
        );
    }

    #[test]
    fn test_warnings_survive_a_zero_return_code() {
        let warning = XmlMessage {
            level: ErrorLevel::Warning,
            line: 3,
            message: "Skipping import".to_string(),
        };
        let outcome = ValidationOutcome::from_code(0, vec![warning.clone()]);

        assert!(outcome.is_valid());
        assert_eq!(
            outcome,
            ValidationOutcome::Valid {
                warnings: vec![warning]
            }
        );
    }

    #[test]
    fn test_element_attributes_and_serialization() {
        let wrapper = LibXml2Wrapper::new();
        let doc = wrapper
            .parse_document(
                r#"<s:root xmlns:s="urn:s" kind="a &amp; b"><s:leaf n="1">x</s:leaf></s:root>"#,
            )
            .unwrap();
        let root = doc.root().unwrap();
        let leaf = root.child("leaf").unwrap();

        assert_eq!(root.prefix(), Some("s"));
        assert_eq!(root.attribute("kind").as_deref(), Some("a & b"));
        assert_eq!(root.attribute("missing"), None);
        assert_eq!(
            root.namespace_declarations(),
            vec![(Some("s".to_string()), "urn:s".to_string())]
        );
        assert_eq!(leaf.parent(), Some(root));
        assert!(root.parent().is_none());
        assert_eq!(leaf.to_xml_string().unwrap(), r#"<s:leaf n="1">x</s:leaf>"#);
    }

    #[test]
    fn test_document_from_element_is_standalone() {
        let wrapper = LibXml2Wrapper::new();
        let doc = wrapper
            .parse_document(r#"<a xmlns="urn:x"><b><c>1</c></b></a>"#)
            .unwrap();
        let b = doc.root().unwrap().child("b").unwrap();

        let copy = XmlDocument::from_element(b).unwrap();
        drop(doc);
        let root = copy.root().unwrap();
        assert_eq!(root.name(), "b");
        assert_eq!(root.namespace(), Some("urn:x"));
        assert_eq!(root.child("c").unwrap().text(), "1");
    }

    #[test]
    fn test_schema_ptr_cloning() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        let cloned_schema = schema.clone();

        assert_eq!(schema.as_ptr(), cloned_schema.as_ptr());
    }

    #[test]
    fn test_concurrent_validation_with_shared_schema() {
        use rayon::prelude::*;

        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();

        let results: Vec<bool> = (0..32)
            .into_par_iter()
            .map(|i| {
                let doc = wrapper
                    .parse_document(&format!("<root>value {}</root>", i))
                    .unwrap();
                wrapper.validate_schema(&schema, &doc).unwrap().is_valid()
            })
            .collect();

        assert!(results.into_iter().all(|valid| valid));
    }
}
