//! Page scripts executed through WebDriver `execute`. Selectors are passed in
//! as arguments so one script works for any site profile.

/// args: [listing_card]
pub const PING: &str = r#"
const cards = arguments[0] ? document.querySelectorAll(arguments[0]) : [];
return {
  ready: document.readyState === 'complete',
  url: window.location.href,
  listingCount: cards.length
};
"#;

/// args: [card, title, company, location, link, snippet]
pub const EXTRACT_LISTINGS: &str = r#"
const [cardSel, titleSel, companySel, locationSel, linkSel, snippetSel] = arguments;
const text = (root, sel) => {
  const el = sel ? root.querySelector(sel) : null;
  return el ? (el.innerText || el.textContent || '').trim() : '';
};
const listings = [];
for (const card of document.querySelectorAll(cardSel)) {
  const anchor = linkSel ? card.querySelector(linkSel) : null;
  listings.push({
    title: text(card, titleSel),
    company: text(card, companySel),
    location: text(card, locationSel),
    link: anchor && anchor.href ? anchor.href : null,
    snippet: text(card, snippetSel)
  });
}
return { listings };
"#;

/// args: [description, requirements, benefits, compensation]
pub const EXTRACT_DETAIL: &str = r#"
const [descSel, reqSel, benSel, compSel] = arguments;
const grab = (sel) => {
  if (!sel) return null;
  const el = document.querySelector(sel);
  const value = el ? (el.innerText || el.textContent || '').trim() : '';
  return value.length ? value : null;
};
return {
  description: grab(descSel) || '',
  requirements: grab(reqSel),
  benefits: grab(benSel),
  compensation: grab(compSel)
};
"#;

/// args: [selector]. Clicks the first match if present.
pub const CLICK_IF_PRESENT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el || el.disabled) return { ok: false, message: 'not found: ' + arguments[0] };
el.scrollIntoView({ block: 'center' });
el.click();
return { ok: true };
"#;

/// args: [pixels]
pub const SCROLL: &str = r#"
window.scrollBy(0, arguments[0]);
return { ok: true, message: String(window.scrollY) };
"#;

/// args: [search_input, location_input, keywords, location]
pub const SEARCH: &str = r#"
const [searchSel, locationSel, keywords, location] = arguments;
const fill = (sel, value) => {
  const el = sel ? document.querySelector(sel) : null;
  if (!el) return null;
  el.focus();
  el.value = value;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return el;
};
const input = fill(searchSel, keywords);
if (!input) return { ok: false, message: 'search input not found' };
if (location) fill(locationSel, location);
const form = input.closest('form');
if (form && form.requestSubmit) {
  form.requestSubmit();
} else {
  input.dispatchEvent(new KeyboardEvent('keydown', { key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true }));
}
return { ok: true };
"#;

/// args: [apply_button, submit_button, full_name, email, phone, submit]
pub const APPLY: &str = r#"
const [applySel, submitSel, fullName, email, phone, submit] = arguments;
const applyBtn = document.querySelector(applySel);
if (!applyBtn) return { submitted: false, message: 'apply button not found' };
applyBtn.click();
const hints = (el) => [el.name, el.id, el.getAttribute('aria-label'), el.getAttribute('autocomplete')]
  .filter(Boolean).join(' ').toLowerCase();
let filled = 0;
for (const el of document.querySelectorAll('input, textarea')) {
  if (el.value) continue;
  const h = hints(el);
  let value = null;
  if (h.includes('email')) value = email;
  else if (h.includes('phone') || h.includes('tel')) value = phone;
  else if (h.includes('name')) value = fullName;
  if (value) {
    el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    filled += 1;
  }
}
if (!submit) return { submitted: false, message: 'dry run: filled ' + filled + ' fields' };
const submitBtn = document.querySelector(submitSel);
if (!submitBtn) return { submitted: false, message: 'submit button not found' };
submitBtn.click();
return { submitted: true, message: 'filled ' + filled + ' fields' };
"#;
