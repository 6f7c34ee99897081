//! Embedded tera templates for generated Markdown

pub const FILE_TEMPLATE: &str = r#"# {{ title }}

| | |
|---|---|
| Path | `{{ path }}` |
| Language | {{ language }} |
| Lines | {{ line_count }} |
| SHA-256 | `{{ content_hash }}` |

{% if file_docs %}{{ file_docs }}

{% endif %}
{%- if imports %}## Imports

{% for path in imports %}- `{{ path }}`
{% endfor %}
{% endif %}
{%- if types %}## Types

{% for ty in types %}### {{ ty.kind }} `{{ ty.qualified_name }}`

*{{ ty.visibility }}, lines {{ ty.lines }}*

{% if ty.docs %}{{ ty.docs }}

{% endif %}
{%- if ty.bases %}**Bases**: {{ ty.bases | join(sep=", ") }}

{% endif %}
{%- if ty.members %}| Member | Kind | Visibility | Type | Signature |
|---|---|---|---|---|
{% for member in ty.members %}| `{{ member.name }}` | {{ member.kind }} | {{ member.visibility }} | {{ member.value_type }} | {{ member.signature }} |
{% endfor %}
{% for member in ty.members %}{% if member.docs %}- `{{ member.name }}`: {{ member.docs }}
{% endif %}{% endfor %}
{% for member in ty.members %}{% if member.calls %}- `{{ member.name }}` calls {{ member.calls | join(sep=", ") }}
{% endif %}{% endfor %}
{% endif %}
{% endfor %}
{% endif %}
{%- if functions %}## Functions

{% for func in functions %}### `{{ func.qualified_name }}`

{% if func.signature %}```
{{ func.signature }}
```

{% endif %}
{%- if func.docs %}{{ func.docs }}

{% endif %}
{%- if func.calls %}Calls {{ func.calls | join(sep=", ") }}

{% endif %}
{%- endfor %}
{% endif %}
{%- if properties %}## Shader Properties

| Property | Display Name | Type | Default | Attributes |
|---|---|---|---|---|
{% for property in properties %}| `{{ property.name }}` | {{ property.display_name }} | {{ property.property_type }} | `{{ property.default_value }}` | {{ property.attributes | join(sep=" ") }} |
{% endfor %}
{% endif %}
{%- if passes %}## Shader Passes

{% for pass in passes %}### `{{ pass.qualified_name }}`

{% if pass.vertex_stage %}- Vertex stage: `{{ pass.vertex_stage }}`
{% endif %}
{%- if pass.fragment_stage %}- Fragment stage: `{{ pass.fragment_stage }}`
{% endif %}
{%- for tag in pass.tags %}- Tag `{{ tag }}`
{% endfor %}
{% endfor %}
{% endif %}
{%- if structure %}## Structure

{{ structure }}
{% endif %}
{%- if class_diagram %}## Class Diagram

{{ class_diagram }}
{% endif %}
"#;

pub const DIAGRAM_TEMPLATE: &str = r#"# {{ title }}

{% if empty %}No entities to show.
{% else %}{{ diagram }}{% endif %}
"#;

pub const DIAGNOSTICS_TEMPLATE: &str = r#"# Diagnostics

{% if diagnostics %}{% for entry in summary %}- **{{ entry.kind }}**: {{ entry.count }}
{% endfor %}
| Kind | Location | Message |
|---|---|---|
{% for diagnostic in diagnostics %}| {{ diagnostic.kind }} | {{ diagnostic.location }} | {{ diagnostic.message }} |
{% endfor %}{% else %}No diagnostics were reported.
{% endif %}
"#;
